/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dashboard graph model plus the editor-local state layered on it.

pub mod clipboard;
pub mod graph;
pub mod history;

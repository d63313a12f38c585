/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dashboard graph editor with a live device channel-binding runtime.
//!
//! The editor owns one [`model::graph::Graph`] per open dashboard and drives
//! it through intents (`app`). At view time the [`runtime::binding`] layer
//! joins a device room on the shared transport and reconciles live channel
//! values into node data.

pub mod app;
pub mod input;
pub mod model;
pub mod persistence;
pub mod prefs;
pub mod registries;
pub mod runtime;
pub mod services;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the process-wide log subscriber.
///
/// `log` records from library code are bridged into the subscriber. An
/// explicit `RUST_LOG` wins over the configured filter.
pub fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        log::debug!("log subscriber already installed");
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    //! Doubles for the external collaborators, shared by unit and scenario tests.

    pub use crate::services::backend::MemoryBackend;
    pub use crate::services::transport::MemoryTransport;
}

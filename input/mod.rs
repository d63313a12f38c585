/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Keyboard shortcuts for the dashboard editor.
//!
//! Pointer gestures arrive as [`EditorIntent`]s from the host canvas. Keyboard
//! events are collected here first, so detection stays separate from the
//! state mutation in `app`.

use keyboard_types::{Key, KeyState, KeyboardEvent, Modifiers, NamedKey};

use crate::app::EditorIntent;

/// Where keyboard focus sits when the event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusTarget {
    #[default]
    Canvas,
    TextInput,
    TextArea,
    ContentEditable,
}

impl FocusTarget {
    pub fn is_text_entry(self) -> bool {
        !matches!(self, FocusTarget::Canvas)
    }
}

/// Keyboard actions detected from one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardActions {
    pub undo: bool,
    pub redo: bool,
    pub copy: bool,
    pub paste: bool,
    pub delete_selected: bool,
    pub close_menu: bool,
}

/// Detect shortcuts in `event`. Nothing fires while the user types in a
/// form field, and only key-down events count.
pub fn collect_actions(event: &KeyboardEvent, focus: FocusTarget) -> KeyboardActions {
    let mut actions = KeyboardActions::default();
    if event.state != KeyState::Down || event.is_composing || focus.is_text_entry() {
        return actions;
    }

    let command = event.modifiers.contains(Modifiers::CONTROL) || event.modifiers.contains(Modifiers::META);
    let shift = event.modifiers.contains(Modifiers::SHIFT);

    match &event.key {
        Key::Character(text) if command => match text.to_ascii_lowercase().as_str() {
            "z" if shift => actions.redo = true,
            "z" => actions.undo = true,
            "y" => actions.redo = true,
            "c" => actions.copy = true,
            "v" => actions.paste = true,
            _ => {},
        },
        Key::Named(NamedKey::Delete | NamedKey::Backspace) if !command => {
            actions.delete_selected = true;
        },
        Key::Named(NamedKey::Escape) => actions.close_menu = true,
        _ => {},
    }
    actions
}

/// Convert keyboard actions to editor intents without applying them.
pub fn intents_from_actions(actions: &KeyboardActions) -> Vec<EditorIntent> {
    let mut intents = Vec::new();
    if actions.close_menu {
        intents.push(EditorIntent::CloseContextMenu);
    }
    if actions.undo {
        intents.push(EditorIntent::Undo);
    }
    if actions.redo {
        intents.push(EditorIntent::Redo);
    }
    if actions.copy {
        intents.push(EditorIntent::Copy);
    }
    if actions.paste {
        intents.push(EditorIntent::Paste);
    }
    if actions.delete_selected {
        intents.push(EditorIntent::RemoveSelected);
    }
    intents
}

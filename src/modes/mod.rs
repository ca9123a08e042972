//! Modes and views
//!
//! A mode decides what knobs, buttons and displays do; a view decides what
//! the pad grid shows. Each surface keeps one active mode (optionally
//! shadowed by a temporary one) and one active view.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::surface::button::ButtonEvent;
use crate::surface::grid::GridPad;
use crate::surface::ids::ControlId;

pub mod console;
pub mod manager;
pub mod view;

pub use console::{ConsoleMode, ConsoleView};
pub use manager::{BehaviorManager, ModeChange, ModeManager};
pub use view::ViewManager;

/// Activation hooks shared by modes and views
pub trait Behavior: Send {
    fn on_activate(&mut self) {}
    fn on_deactivate(&mut self) {}
}

/// Behavior governing knobs, buttons and displays
pub trait Mode: Behavior {
    /// Light or ring value for a control while this mode is shown
    fn feedback(&self, _control: ControlId) -> Option<i32> {
        None
    }

    /// Light value for a mode-relative button
    fn button_feedback(&self, _index: u8) -> Option<i32> {
        None
    }

    /// Ring or fader value for a mode-relative knob
    fn knob_feedback(&self, _index: u8) -> Option<i32> {
        None
    }

    fn on_button(&mut self, _index: u8, _event: ButtonEvent) {}

    fn on_knob(&mut self, _index: u8, _value: u16) {}
}

/// Behavior governing the pad grid
pub trait View: Behavior {
    /// Pad pressed (velocity > 0) or released (velocity 0)
    fn on_grid_note(&mut self, _pad: GridPad, _velocity: u8) {}

    fn on_grid_note_long_press(&mut self, _pad: GridPad) {}

    /// Light value for a pad; `None` leaves the pad dark
    fn pad_light(&self, _pad: GridPad) -> Option<i32> {
        None
    }

    /// Light value for a non-grid control while this view is active
    fn feedback(&self, _control: ControlId) -> Option<i32> {
        None
    }
}

macro_rules! behavior_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

behavior_id!(
    /// Name a mode is registered under
    ModeId
);
behavior_id!(
    /// Name a view is registered under
    ViewId
);

//! Button press/hold/release state machine
//!
//! A press moves UP → DOWN and arms a long-press check. The check only
//! promotes to LONG when it belongs to the press that is still held; a check
//! left over from an earlier, already released press is a no-op.

use serde::{Deserialize, Serialize};

use super::output::OutputAddress;
use crate::command::Command;
use crate::surface::ids::ButtonId;

/// Default hold time before a press becomes a long press
pub const DEFAULT_LONG_PRESS_MS: u64 = 400;

/// Event fired to a bound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonEvent {
    Down,
    Long,
    Up,
}

/// Physical state of a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    #[default]
    Up,
    Down,
    Long,
}

/// Press tracking shared by buttons and grid notes
#[derive(Debug, Clone, Default)]
pub struct PressState {
    state: ButtonState,
    consumed: bool,
    /// Incremented on every press; ties a long-press check to its press
    epoch: u64,
}

impl PressState {
    pub fn state(&self) -> ButtonState {
        self.state
    }

    pub fn is_pressed(&self) -> bool {
        self.state != ButtonState::Up
    }

    pub fn is_long_pressed(&self) -> bool {
        self.state == ButtonState::Long
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Register a press
    ///
    /// Returns the epoch to schedule the long-press check with, or `None`
    /// when the control is already held (repeated non-zero values).
    pub fn press(&mut self) -> Option<u64> {
        if self.state != ButtonState::Up {
            return None;
        }
        self.state = ButtonState::Down;
        self.consumed = false;
        self.epoch += 1;
        Some(self.epoch)
    }

    /// Long-press check fired; true when LONG must fire
    pub fn long_press_elapsed(&mut self, epoch: u64) -> bool {
        if self.state == ButtonState::Down && self.epoch == epoch {
            self.state = ButtonState::Long;
            true
        } else {
            false
        }
    }

    /// Register a release; true when UP must fire
    ///
    /// A release without a preceding press is ignored.
    pub fn release(&mut self) -> bool {
        if self.state == ButtonState::Up {
            return false;
        }
        self.state = ButtonState::Up;
        if self.consumed {
            self.consumed = false;
            return false;
        }
        true
    }

    /// Swallow the next release of the current press
    ///
    /// Has no effect while the control is up, so it can never carry over to
    /// a press that has not happened yet.
    pub fn set_consumed(&mut self) -> bool {
        if self.state == ButtonState::Up {
            return false;
        }
        self.consumed = true;
        true
    }
}

/// A logical button owned by a surface
#[derive(Debug, Clone)]
pub struct Button {
    id: ButtonId,
    command: Option<Command>,
    light: Option<OutputAddress>,
    press: PressState,
    last_value: u8,
}

impl Button {
    pub fn new(id: ButtonId, light: Option<OutputAddress>) -> Self {
        Self {
            id,
            command: None,
            light,
            press: PressState::default(),
            last_value: 0,
        }
    }

    pub fn id(&self) -> ButtonId {
        self.id
    }

    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    pub fn bind(&mut self, command: Option<Command>) {
        self.command = command;
    }

    pub fn light(&self) -> Option<OutputAddress> {
        self.light
    }

    pub fn state(&self) -> ButtonState {
        self.press.state()
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_pressed()
    }

    /// Value (velocity) of the most recent press
    pub fn last_value(&self) -> u8 {
        self.last_value
    }

    pub(crate) fn press_state_mut(&mut self) -> &mut PressState {
        &mut self.press
    }

    pub(crate) fn record_press_value(&mut self, value: u8) {
        self.last_value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_press() {
        let mut press = PressState::default();
        let epoch = press.press().unwrap();
        assert_eq!(press.state(), ButtonState::Down);
        assert!(press.release());
        assert_eq!(press.state(), ButtonState::Up);
        // Check arriving after the release does nothing
        assert!(!press.long_press_elapsed(epoch));
        assert_eq!(press.state(), ButtonState::Up);
    }

    #[test]
    fn test_long_press() {
        let mut press = PressState::default();
        let epoch = press.press().unwrap();
        assert!(press.long_press_elapsed(epoch));
        assert!(press.is_long_pressed());
        // A second check for the same press cannot fire LONG twice
        assert!(!press.long_press_elapsed(epoch));
        assert!(press.release());
    }

    #[test]
    fn test_stale_check_from_previous_press() {
        let mut press = PressState::default();
        let first = press.press().unwrap();
        assert!(press.release());
        let second = press.press().unwrap();
        assert_ne!(first, second);
        assert!(!press.long_press_elapsed(first));
        assert_eq!(press.state(), ButtonState::Down);
        assert!(press.long_press_elapsed(second));
    }

    #[test]
    fn test_repeated_press_values_are_ignored() {
        let mut press = PressState::default();
        assert!(press.press().is_some());
        assert!(press.press().is_none());
    }

    #[test]
    fn test_consumed_is_one_shot() {
        let mut press = PressState::default();
        press.press();
        assert!(press.set_consumed());
        assert!(press.set_consumed()); // does not accumulate
        assert!(!press.release());

        press.press();
        assert!(!press.is_consumed());
        assert!(press.release());
    }

    #[test]
    fn test_consumed_ignored_while_up() {
        let mut press = PressState::default();
        assert!(!press.set_consumed());
        press.press();
        assert!(press.release());
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut press = PressState::default();
        assert!(!press.release());
    }
}

//! Knobs, faders and other value controls

use super::ids::ContinuousId;
use super::output::OutputAddress;
use crate::command::Command;

/// A logical continuous control owned by a surface
#[derive(Debug, Clone)]
pub struct ContinuousControl {
    id: ContinuousId,
    command: Option<Command>,
    feedback: Option<OutputAddress>,
    last_value: Option<u16>,
}

impl ContinuousControl {
    pub fn new(id: ContinuousId, feedback: Option<OutputAddress>) -> Self {
        Self {
            id,
            command: None,
            feedback,
            last_value: None,
        }
    }

    pub fn id(&self) -> ContinuousId {
        self.id
    }

    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    pub fn bind(&mut self, command: Option<Command>) {
        self.command = command;
    }

    pub fn feedback(&self) -> Option<OutputAddress> {
        self.feedback
    }

    /// Last value received from the hardware
    pub fn last_value(&self) -> Option<u16> {
        self.last_value
    }

    /// Store an incoming value; returns false when it repeats the last one
    pub fn record(&mut self, value: u16) -> bool {
        if self.last_value == Some(value) {
            return false;
        }
        self.last_value = Some(value);
        true
    }
}

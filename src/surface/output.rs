//! Output cache - suppresses redundant hardware writes
//!
//! Feedback is refreshed on every flush, but only values that differ from
//! what the hardware last received go out on the wire. Entries are keyed by
//! (channel, control) within each output kind; an unknown entry always writes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

use crate::device::MidiSink;
use crate::error::SurfaceError;
use crate::midi::MidiMessage;

/// Wire message used to write an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Note,
    ControlChange,
    /// 14-bit value, e.g. motor fader position; `control` is unused on the wire
    PitchBend,
    PolyPressure,
}

/// MIDI address of a control, used for both input and feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputAddress {
    pub kind: OutputKind,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Note or CC number (0-255)
    pub control: u8,
}

impl OutputAddress {
    pub fn note(channel: u8, note: u8) -> Self {
        Self { kind: OutputKind::Note, channel, control: note }
    }

    pub fn cc(channel: u8, cc: u8) -> Self {
        Self { kind: OutputKind::ControlChange, channel, control: cc }
    }

    pub fn pitch_bend(channel: u8) -> Self {
        Self { kind: OutputKind::PitchBend, channel, control: 0 }
    }

    /// Build the wire message carrying `value`
    pub fn message(&self, value: i32) -> MidiMessage {
        let seven_bit = value.clamp(0, 127) as u8;
        let channel = self.channel & 0x0F;
        match self.kind {
            OutputKind::Note => MidiMessage::NoteOn {
                channel,
                note: self.control,
                velocity: seven_bit,
            },
            OutputKind::ControlChange => MidiMessage::ControlChange {
                channel,
                cc: self.control,
                value: seven_bit,
            },
            OutputKind::PitchBend => MidiMessage::PitchBend {
                channel,
                value: value.clamp(0, 16383) as u16,
            },
            OutputKind::PolyPressure => MidiMessage::PolyPressure {
                channel,
                note: self.control,
                pressure: seven_bit,
            },
        }
    }
}

impl fmt::Display for OutputAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ch:{} #{}", self.kind, self.channel + 1, self.control)
    }
}

/// Last value written per registered output
#[derive(Debug, Default)]
pub struct OutputCache {
    /// `None` means unknown: the next update writes unconditionally
    entries: HashMap<OutputAddress, Option<i32>>,
    /// Total number of hardware writes issued
    writes: u64,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output; its value starts unknown
    pub fn register(&mut self, address: OutputAddress) -> Result<(), SurfaceError> {
        if address.channel > 15 {
            return Err(SurfaceError::InvalidLayout(format!(
                "output {} uses channel {} (must be 1-16)",
                address,
                address.channel + 1
            )));
        }
        let seven_bit_address = matches!(
            address.kind,
            OutputKind::Note | OutputKind::ControlChange | OutputKind::PolyPressure
        );
        if seven_bit_address && address.control > 127 {
            return Err(SurfaceError::InvalidLayout(format!(
                "output {} has control number above 127",
                address
            )));
        }
        self.entries.entry(address).or_insert(None);
        Ok(())
    }

    pub fn is_registered(&self, address: &OutputAddress) -> bool {
        self.entries.contains_key(address)
    }

    /// Value last written to `address`, if known
    pub fn cached(&self, address: &OutputAddress) -> Option<i32> {
        self.entries.get(address).copied().flatten()
    }

    /// Number of hardware writes issued so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Write `value` only if it differs from the cached one
    ///
    /// Returns true when a write went out.
    pub fn update(&mut self, address: OutputAddress, value: i32, sink: &mut dyn MidiSink) -> bool {
        match self.entries.get(&address) {
            None => {
                error!("{}", SurfaceError::UnregisteredOutput {
                    channel: address.channel,
                    control: address.control,
                });
                false
            }
            Some(Some(cached)) if *cached == value => {
                trace!("Output {} unchanged ({}), skipping write", address, value);
                false
            }
            Some(_) => self.write(address, value, sink),
        }
    }

    /// Write `value` regardless of the cached one
    pub fn set(&mut self, address: OutputAddress, value: i32, sink: &mut dyn MidiSink) -> bool {
        if !self.entries.contains_key(&address) {
            error!("{}", SurfaceError::UnregisteredOutput {
                channel: address.channel,
                control: address.control,
            });
            return false;
        }
        self.write(address, value, sink)
    }

    /// Forget every cached value
    pub fn invalidate(&mut self) {
        for value in self.entries.values_mut() {
            *value = None;
        }
    }

    /// Forget the cached value of a single output
    pub fn invalidate_one(&mut self, address: OutputAddress) {
        match self.entries.get_mut(&address) {
            Some(value) => *value = None,
            None => error!("{}", SurfaceError::UnregisteredOutput {
                channel: address.channel,
                control: address.control,
            }),
        }
    }

    fn write(&mut self, address: OutputAddress, value: i32, sink: &mut dyn MidiSink) -> bool {
        let bytes = address.message(value).encode();
        match sink.send(&bytes) {
            Ok(()) => {
                self.entries.insert(address, Some(value));
                self.writes += 1;
                true
            }
            Err(e) => {
                // Leave the entry unknown so the next refresh retries
                warn!("Failed to write output {}: {:#}", address, e);
                self.entries.insert(address, None);
                false
            }
        }
    }
}

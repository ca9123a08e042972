//! MIDI message types and the raw event decoder
//!
//! Turns raw bytes from the hardware into typed messages and back again.

use std::fmt;
use tracing::warn;

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (always 0 once decoded)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive payload without the F0/F7 framing
    SysEx { data: Vec<u8> },
}

/// Reconstruct a 14-bit value from its two 7-bit data bytes
pub fn value_14bit(lsb: u8, msb: u8) -> u16 {
    (lsb & 0x7F) as u16 + (msb & 0x7F) as u16 * 128
}

/// Split a 14-bit value into (low byte, high byte)
pub fn split_14bit(value: u16) -> (u8, u8) {
    let value = value.min(16383);
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

impl MidiMessage {
    /// Decode a 3-byte channel message
    ///
    /// Note-off always carries velocity 0 so that downstream state machines
    /// see a release regardless of the release velocity the device reports.
    /// Unknown status values are logged and dropped.
    pub fn decode(status: u8, data1: u8, data2: u8) -> Option<Self> {
        let channel = status & 0x0F;
        let data1 = data1 & 0x7F;
        let data2 = data2 & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff { channel, note: data1, velocity: 0 }),
            0x90 => Some(MidiMessage::NoteOn { channel, note: data1, velocity: data2 }),
            0xA0 => Some(MidiMessage::PolyPressure { channel, note: data1, pressure: data2 }),
            0xB0 => Some(MidiMessage::ControlChange { channel, cc: data1, value: data2 }),
            0xC0 => Some(MidiMessage::ProgramChange { channel, program: data1 }),
            0xD0 => Some(MidiMessage::ChannelPressure { channel, pressure: data1 }),
            0xE0 => Some(MidiMessage::PitchBend { channel, value: value_14bit(data1, data2) }),
            _ => {
                warn!("Dropping MIDI message with unknown status 0x{:02X}", status);
                None
            }
        }
    }

    /// Parse a MIDI message from raw bytes of any length
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status would require per-port state; the hardware we
        // talk to always sends full messages
        if status < 0x80 {
            return None;
        }

        if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx { data: data[1..end].to_vec() });
        }

        if status > 0xF0 {
            warn!("Dropping system message 0x{:02X}", status);
            return None;
        }

        // Program change and channel pressure only carry one data byte
        let needed = match status & 0xF0 {
            0xC0 | 0xD0 => 2,
            _ => 3,
        };
        if data.len() < needed {
            return None;
        }

        Self::decode(status, data[1], data.get(2).copied().unwrap_or(0))
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                vec![0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let (lsb, msb) = split_14bit(value);
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = vec![0xF0];
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
        }
    }

    /// Get the channel for channel messages (0-15), None for SysEx
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. } |
            MidiMessage::NoteOn { channel, .. } |
            MidiMessage::PolyPressure { channel, .. } |
            MidiMessage::ControlChange { channel, .. } |
            MidiMessage::ProgramChange { channel, .. } |
            MidiMessage::ChannelPressure { channel, .. } |
            MidiMessage::PitchBend { channel, .. } => Some(channel),
            MidiMessage::SysEx { .. } => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => {
                write!(f, "SysEx {} bytes", data.len())
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = MidiMessage::parse(&[0x90, 60, 100]).unwrap();

        assert_eq!(msg, MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
    }

    #[test]
    fn test_note_on_velocity_zero_stays_note_on() {
        // The button state machine treats value 0 as a release; the decoder
        // does not rewrite the message type
        let msg = MidiMessage::decode(0x93, 60, 0).unwrap();
        assert_eq!(msg, MidiMessage::NoteOn { channel: 3, note: 60, velocity: 0 });
    }

    #[test]
    fn test_note_off_forces_velocity_zero() {
        let msg = MidiMessage::decode(0x81, 60, 64).unwrap();

        assert_eq!(msg, MidiMessage::NoteOff {
            channel: 1,
            note: 60,
            velocity: 0,
        });
    }

    #[test]
    fn test_control_change() {
        let msg = MidiMessage::parse(&[0xB2, 7, 100]).unwrap();

        assert_eq!(msg, MidiMessage::ControlChange {
            channel: 2,
            cc: 7,
            value: 100,
        });
    }

    #[test]
    fn test_aftertouch_and_program_change() {
        assert_eq!(
            MidiMessage::decode(0xA0, 36, 90),
            Some(MidiMessage::PolyPressure { channel: 0, note: 36, pressure: 90 })
        );
        assert_eq!(
            MidiMessage::decode(0xD5, 70, 0),
            Some(MidiMessage::ChannelPressure { channel: 5, pressure: 70 })
        );
        assert_eq!(
            MidiMessage::parse(&[0xC1, 12]),
            Some(MidiMessage::ProgramChange { channel: 1, program: 12 })
        );
    }

    #[test]
    fn test_pitch_bend() {
        let msg = MidiMessage::parse(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 8192 });

        // data1 + data2 * 128
        let msg = MidiMessage::decode(0xE8, 5, 3).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 8, value: 5 + 3 * 128 });
    }

    #[test]
    fn test_unknown_status_is_dropped() {
        assert_eq!(MidiMessage::decode(0x70, 1, 2), None);
        assert_eq!(MidiMessage::parse(&[0xF8]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
    }

    #[test]
    fn test_sysex_round_trip() {
        let raw = [0xF0, 0x00, 0x00, 0x66, 0x14, 0x01, 0xF7];
        let msg = MidiMessage::parse(&raw).unwrap();
        assert_eq!(msg, MidiMessage::SysEx { data: vec![0x00, 0x00, 0x66, 0x14, 0x01] });
        assert_eq!(msg.channel(), None);
        assert_eq!(msg.encode(), raw.to_vec());
    }

    #[test]
    fn test_encode_pitch_bend_low_byte_first() {
        let msg = MidiMessage::PitchBend { channel: 2, value: 16383 };
        assert_eq!(msg.encode(), vec![0xE2, 0x7F, 0x7F]);

        let msg = MidiMessage::PitchBend { channel: 0, value: 130 };
        assert_eq!(msg.encode(), vec![0xE0, 2, 1]);
    }
}

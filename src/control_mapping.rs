//! Control layout parser
//!
//! Parses a layout CSV mapping logical controls to the MIDI addresses a
//! controller model uses for input and feedback.
//!
//! ```text
//! control_id,group,channel,midi,feedback
//! play,transport,1,note=94,note=94
//! fader1,strip,1,pb,pb
//! knob1,strip,1,cc=16,cc=48
//! jog,transport,1,cc=60,
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::surface::grid::GridLayout;
use crate::surface::ids::ControlId;
use crate::surface::output::{OutputAddress, OutputKind};

/// Layout row from CSV
#[derive(Debug, Clone, Deserialize)]
struct LayoutRow {
    control_id: String,
    group: String,
    /// 1-based MIDI channel
    channel: u8,
    midi: String,
    #[serde(default)]
    feedback: String,
}

/// Parsed MIDI message specification
#[derive(Debug, Clone, PartialEq)]
pub enum MidiSpec {
    /// Control Change: cc=number
    ControlChange { cc: u8 },
    /// Note: note=number
    Note { note: u8 },
    /// Polyphonic aftertouch: at=number
    PolyPressure { note: u8 },
    /// PitchBend: pb, or pb=chN to override the row channel
    PitchBend { channel: Option<u8> },
}

impl MidiSpec {
    /// Parse a MIDI spec string like "cc=70", "note=110", "at=36", "pb=ch1"
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        if let Some(cc_str) = spec.strip_prefix("cc=") {
            let cc = parse_data_byte(cc_str).with_context(|| format!("Invalid CC number: {}", cc_str))?;
            Ok(MidiSpec::ControlChange { cc })
        } else if let Some(note_str) = spec.strip_prefix("note=") {
            let note = parse_data_byte(note_str)
                .with_context(|| format!("Invalid note number: {}", note_str))?;
            Ok(MidiSpec::Note { note })
        } else if let Some(note_str) = spec.strip_prefix("at=") {
            let note = parse_data_byte(note_str)
                .with_context(|| format!("Invalid aftertouch note: {}", note_str))?;
            Ok(MidiSpec::PolyPressure { note })
        } else if spec == "pb" {
            Ok(MidiSpec::PitchBend { channel: None })
        } else if let Some(pb_str) = spec.strip_prefix("pb=") {
            let Some(ch_str) = pb_str.strip_prefix("ch") else {
                bail!("Invalid pitch bend format: {}", spec);
            };
            let channel = parse_channel(ch_str).with_context(|| format!("Invalid channel: {}", pb_str))?;
            Ok(MidiSpec::PitchBend { channel: Some(channel) })
        } else {
            bail!("Unknown MIDI spec format: {}", spec);
        }
    }

    /// Address on `channel` (0-based) unless the spec carries its own
    pub fn address(&self, channel: u8) -> OutputAddress {
        match *self {
            MidiSpec::ControlChange { cc } => OutputAddress::cc(channel, cc),
            MidiSpec::Note { note } => OutputAddress::note(channel, note),
            MidiSpec::PolyPressure { note } => OutputAddress {
                kind: OutputKind::PolyPressure,
                channel,
                control: note,
            },
            MidiSpec::PitchBend { channel: own } => OutputAddress::pitch_bend(own.unwrap_or(channel)),
        }
    }
}

fn parse_data_byte(s: &str) -> Result<u8> {
    let value = s.trim().parse::<u8>()?;
    if value > 127 {
        bail!("{} is above 127", value);
    }
    Ok(value)
}

/// Parse a 1-based channel into 0-based
fn parse_channel(s: &str) -> Result<u8> {
    channel_index(s.trim().parse::<u8>()?)
}

fn channel_index(channel: u8) -> Result<u8> {
    if !(1..=16).contains(&channel) {
        bail!("channel {} must be 1-16", channel);
    }
    Ok(channel - 1)
}

/// A logical control and its MIDI addresses
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEntry {
    pub control: ControlId,
    pub group: String,
    pub input: OutputAddress,
    pub feedback: Option<OutputAddress>,
}

/// Control layout of one controller model
#[derive(Debug, Clone, Default)]
pub struct ControlLayout {
    entries: Vec<LayoutEntry>,
    by_control: HashMap<ControlId, usize>,
    by_input: HashMap<OutputAddress, usize>,
}

impl ControlLayout {
    /// Load a layout from a CSV file
    pub async fn load_from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let csv_content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read layout file: {}", path.display()))?;

        Self::parse_csv(&csv_content).with_context(|| format!("Invalid layout file: {}", path.display()))
    }

    /// Parse CSV content
    ///
    /// Rejects unknown control ids, duplicate controls and two controls
    /// sharing an input address.
    pub fn parse_csv(csv_content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(csv_content.as_bytes());
        let mut layout = Self::default();

        for (line, result) in reader.deserialize().enumerate() {
            let row: LayoutRow = result.with_context(|| format!("Failed to parse layout row {}", line + 1))?;
            let entry = Self::parse_row(&row).with_context(|| format!("Invalid layout row for '{}'", row.control_id))?;
            layout.insert(entry)?;
        }

        let groups: HashSet<&str> = layout.entries.iter().map(|e| e.group.as_str()).collect();
        info!(
            "Loaded {} control mappings in {} groups",
            layout.entries.len(),
            groups.len()
        );

        Ok(layout)
    }

    fn parse_row(row: &LayoutRow) -> Result<LayoutEntry> {
        let control: ControlId = row.control_id.parse()?;
        let channel = channel_index(row.channel)?;
        let input = MidiSpec::parse(&row.midi)?.address(channel);
        let feedback = match row.feedback.as_str() {
            "" | "-" => None,
            spec => Some(MidiSpec::parse(spec)?.address(channel)),
        };
        Ok(LayoutEntry {
            control,
            group: row.group.clone(),
            input,
            feedback,
        })
    }

    fn insert(&mut self, entry: LayoutEntry) -> Result<()> {
        if self.by_control.contains_key(&entry.control) {
            bail!("Control '{}' is listed twice", entry.control);
        }
        if let Some(&other) = self.by_input.get(&entry.input) {
            bail!(
                "Controls '{}' and '{}' share input {}",
                self.entries[other].control,
                entry.control,
                entry.input
            );
        }
        let index = self.entries.len();
        self.by_control.insert(entry.control, index);
        self.by_input.insert(entry.input, index);
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the entry of a control
    pub fn get(&self, control: &ControlId) -> Option<&LayoutEntry> {
        self.by_control.get(control).map(|&i| &self.entries[i])
    }

    /// Find the control listening on an input address (reverse lookup)
    pub fn find_by_input(&self, input: &OutputAddress) -> Option<&LayoutEntry> {
        self.by_input.get(input).map(|&i| &self.entries[i])
    }

    /// Controls of a group, in file order
    pub fn group(&self, group: &str) -> Vec<ControlId> {
        self.entries
            .iter()
            .filter(|e| e.group == group)
            .map(|e| e.control)
            .collect()
    }

    /// Fail when a control uses a note that belongs to the pad grid
    pub fn check_grid_overlap(&self, grid: &GridLayout) -> Result<()> {
        let grid_notes = grid.raw_notes();
        let on_grid = |address: &OutputAddress| {
            address.kind == OutputKind::Note
                && address.channel == grid.channel()
                && grid_notes.contains(&address.control)
        };
        for entry in &self.entries {
            if on_grid(&entry.input) || entry.feedback.as_ref().map_or(false, on_grid) {
                bail!(
                    "Control '{}' overlaps the pad grid at {}",
                    entry.control,
                    entry.input
                );
            }
        }
        Ok(())
    }
}

/// Default embedded layout: Mackie Control style unit
pub const DEFAULT_CSV: &str = include_str!("../docs/default-layout.csv");

static DEFAULT_LAYOUT: OnceLock<ControlLayout> = OnceLock::new();

/// Load the default layout (cached after first parse)
pub fn load_default_layout() -> Result<ControlLayout> {
    if let Some(layout) = DEFAULT_LAYOUT.get() {
        return Ok(layout.clone());
    }

    let layout = ControlLayout::parse_csv(DEFAULT_CSV)?;
    // Ignore error if another thread set it first
    let _ = DEFAULT_LAYOUT.set(layout.clone());
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ids::{ButtonId, ContinuousId};

    #[test]
    fn test_midi_spec_parsing() {
        assert_eq!(MidiSpec::parse("cc=70").unwrap(), MidiSpec::ControlChange { cc: 70 });
        assert_eq!(MidiSpec::parse("note=110").unwrap(), MidiSpec::Note { note: 110 });
        assert_eq!(MidiSpec::parse("at=36").unwrap(), MidiSpec::PolyPressure { note: 36 });
        assert_eq!(MidiSpec::parse("pb").unwrap(), MidiSpec::PitchBend { channel: None });
        assert_eq!(
            MidiSpec::parse("pb=ch8").unwrap(),
            MidiSpec::PitchBend { channel: Some(7) } // 1-based in text
        );

        assert!(MidiSpec::parse("note=128").is_err());
        assert!(MidiSpec::parse("pb=ch0").is_err());
        assert!(MidiSpec::parse("sysex").is_err());
    }

    #[test]
    fn test_spec_address_uses_row_channel() {
        assert_eq!(MidiSpec::parse("pb").unwrap().address(3), OutputAddress::pitch_bend(3));
        assert_eq!(MidiSpec::parse("pb=ch9").unwrap().address(0), OutputAddress::pitch_bend(8));
        assert_eq!(MidiSpec::parse("cc=16").unwrap().address(2), OutputAddress::cc(2, 16));
    }

    #[test]
    fn test_load_default_layout() {
        let layout = load_default_layout().unwrap();

        let play = layout.get(&ControlId::Button(ButtonId::Play)).unwrap();
        assert_eq!(play.group, "transport");
        assert_eq!(play.input, OutputAddress::note(0, 94));
        assert_eq!(play.feedback, Some(OutputAddress::note(0, 94)));

        let fader = layout.get(&ControlId::Continuous(ContinuousId::Fader(1))).unwrap();
        assert_eq!(fader.input, OutputAddress::pitch_bend(1));

        let knob = layout.get(&ControlId::Continuous(ContinuousId::Knob(0))).unwrap();
        assert_eq!(knob.input, OutputAddress::cc(0, 16));
        assert_eq!(knob.feedback, Some(OutputAddress::cc(0, 48)));

        let jog = layout.get(&ControlId::Continuous(ContinuousId::Jog)).unwrap();
        assert_eq!(jog.feedback, None);

        assert_eq!(layout.group("strip").len(), 48);
    }

    #[test]
    fn test_reverse_lookup() {
        let layout = load_default_layout().unwrap();
        let entry = layout.find_by_input(&OutputAddress::note(0, 16)).unwrap();
        assert_eq!(entry.control, ControlId::Button(ButtonId::Mute(0)));
        assert!(layout.find_by_input(&OutputAddress::note(5, 16)).is_none());
    }

    #[test]
    fn test_rejects_conflicts() {
        let duplicate_input = "control_id,group,channel,midi,feedback\n\
                               play,transport,1,note=94,note=94\n\
                               stop,transport,1,note=94,note=93\n";
        let err = ControlLayout::parse_csv(duplicate_input).unwrap_err();
        assert!(format!("{:#}", err).contains("share input"));

        let duplicate_control = "control_id,group,channel,midi,feedback\n\
                                 play,transport,1,note=94,\n\
                                 play,transport,1,note=95,\n";
        assert!(ControlLayout::parse_csv(duplicate_control).is_err());

        let unknown = "control_id,group,channel,midi,feedback\n\
                       wobble,transport,1,note=94,\n";
        assert!(ControlLayout::parse_csv(unknown).is_err());

        let bad_channel = "control_id,group,channel,midi,feedback\n\
                           play,transport,17,note=94,\n";
        assert!(ControlLayout::parse_csv(bad_channel).is_err());
    }

    #[test]
    fn test_grid_overlap() {
        let csv = "control_id,group,channel,midi,feedback\n\
                   scene1,grid,1,note=89,note=89\n";
        let layout = ControlLayout::parse_csv(csv).unwrap();

        let below = GridLayout::sequential(0, 8, 8, 11).unwrap(); // 11..=74
        assert!(layout.check_grid_overlap(&below).is_ok());

        let covering = GridLayout::sequential(0, 8, 8, 36).unwrap(); // 36..=99
        assert!(layout.check_grid_overlap(&covering).is_err());

        let other_channel = GridLayout::sequential(1, 8, 8, 36).unwrap();
        assert!(layout.check_grid_overlap(&other_channel).is_ok());
    }
}

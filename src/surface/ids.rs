//! Logical control identities
//!
//! Identities never depend on declaration order. Families of numbered
//! controls (scene buttons, faders, a row of pad-row buttons...) carry their
//! index as data and offsetting is a bounds-checked index operation.
//!
//! Text names are 1-based (`scene1`, `row2_5`, `fader8`), matching how
//! controls are labelled on hardware; indices stored in the ids are 0-based.

use std::fmt;
use std::str::FromStr;

use crate::error::SurfaceError;

/// Number of rows available to `ButtonId::Row`
pub const MAX_ROWS: u8 = 8;
/// Number of columns available to `ButtonId::Row`
pub const MAX_COLUMNS: u8 = 16;
/// Upper bound for every other numbered family
pub const MAX_INDEX: u8 = 32;

/// Logical button identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ButtonId {
    Shift,
    Select,
    Delete,
    Duplicate,
    Undo,
    Redo,
    Play,
    Stop,
    Record,
    Loop,
    Rewind,
    FastForward,
    Metronome,
    TapTempo,
    Automation,
    Session,
    Note,
    Device,
    Browse,
    Mixer,
    Clip,
    Left,
    Right,
    Up,
    Down,
    PageLeft,
    PageRight,
    OctaveUp,
    OctaveDown,
    Master,
    /// Button in a row of buttons above or below the main controls
    Row { row: u8, column: u8 },
    Scene(u8),
    Track(u8),
    Mute(u8),
    Solo(u8),
    RecArm(u8),
    Function(u8),
}

/// Name table for buttons without an index
const NAMED_BUTTONS: &[(&str, ButtonId)] = &[
    ("shift", ButtonId::Shift),
    ("select", ButtonId::Select),
    ("delete", ButtonId::Delete),
    ("duplicate", ButtonId::Duplicate),
    ("undo", ButtonId::Undo),
    ("redo", ButtonId::Redo),
    ("play", ButtonId::Play),
    ("stop", ButtonId::Stop),
    ("record", ButtonId::Record),
    ("loop", ButtonId::Loop),
    ("rewind", ButtonId::Rewind),
    ("fast_forward", ButtonId::FastForward),
    ("metronome", ButtonId::Metronome),
    ("tap_tempo", ButtonId::TapTempo),
    ("automation", ButtonId::Automation),
    ("session", ButtonId::Session),
    ("note", ButtonId::Note),
    ("device", ButtonId::Device),
    ("browse", ButtonId::Browse),
    ("mixer", ButtonId::Mixer),
    ("clip", ButtonId::Clip),
    ("left", ButtonId::Left),
    ("right", ButtonId::Right),
    ("up", ButtonId::Up),
    ("down", ButtonId::Down),
    ("page_left", ButtonId::PageLeft),
    ("page_right", ButtonId::PageRight),
    ("octave_up", ButtonId::OctaveUp),
    ("octave_down", ButtonId::OctaveDown),
    ("master", ButtonId::Master),
];

/// Name prefixes for single-index button families
const INDEXED_BUTTONS: &[(&str, fn(u8) -> ButtonId)] = &[
    ("scene", ButtonId::Scene),
    ("track", ButtonId::Track),
    ("mute", ButtonId::Mute),
    ("solo", ButtonId::Solo),
    ("rec", ButtonId::RecArm),
    ("f", ButtonId::Function),
];

impl ButtonId {
    /// Build a row button, `None` when out of range
    pub fn row(row: u8, column: u8) -> Option<Self> {
        (row < MAX_ROWS && column < MAX_COLUMNS).then_some(ButtonId::Row { row, column })
    }

    /// Index within its family, `None` for named buttons
    pub fn index(&self) -> Option<u8> {
        match *self {
            ButtonId::Row { column, .. } => Some(column),
            ButtonId::Scene(i)
            | ButtonId::Track(i)
            | ButtonId::Mute(i)
            | ButtonId::Solo(i)
            | ButtonId::RecArm(i)
            | ButtonId::Function(i) => Some(i),
            _ => None,
        }
    }

    /// The control `n` places further along the same family
    ///
    /// `ButtonId::Scene(0).offset(3)` is `Scene(3)`; row buttons offset by
    /// column. Returns `None` for named buttons and when the result leaves
    /// the family.
    pub fn offset(self, n: u8) -> Option<Self> {
        match self {
            ButtonId::Row { row, column } => ButtonId::row(row, column.checked_add(n)?),
            ButtonId::Scene(i) => Self::bounded(i, n).map(ButtonId::Scene),
            ButtonId::Track(i) => Self::bounded(i, n).map(ButtonId::Track),
            ButtonId::Mute(i) => Self::bounded(i, n).map(ButtonId::Mute),
            ButtonId::Solo(i) => Self::bounded(i, n).map(ButtonId::Solo),
            ButtonId::RecArm(i) => Self::bounded(i, n).map(ButtonId::RecArm),
            ButtonId::Function(i) => Self::bounded(i, n).map(ButtonId::Function),
            _ => None,
        }
    }

    fn bounded(index: u8, n: u8) -> Option<u8> {
        index.checked_add(n).filter(|i| *i < MAX_INDEX)
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let ButtonId::Row { row, column } = *self {
            return write!(f, "row{}_{}", row + 1, column + 1);
        }
        if let Some((name, _)) = NAMED_BUTTONS.iter().find(|(_, id)| id == self) {
            return f.write_str(name);
        }
        let prefix = match self {
            ButtonId::Scene(_) => "scene",
            ButtonId::Track(_) => "track",
            ButtonId::Mute(_) => "mute",
            ButtonId::Solo(_) => "solo",
            ButtonId::RecArm(_) => "rec",
            _ => "f",
        };
        write!(f, "{}{}", prefix, self.index().unwrap_or(0) + 1)
    }
}

impl FromStr for ButtonId {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let unknown = || SurfaceError::UnknownControl(s.to_string());

        if let Some((_, id)) = NAMED_BUTTONS.iter().find(|(n, _)| *n == name) {
            return Ok(*id);
        }

        if let Some(rest) = name.strip_prefix("row") {
            let (row, column) = rest.split_once('_').ok_or_else(unknown)?;
            let row = parse_one_based(row).ok_or_else(unknown)?;
            let column = parse_one_based(column).ok_or_else(unknown)?;
            return ButtonId::row(row, column).ok_or_else(unknown);
        }

        // Longest prefix first so "rec" never shadows a future "record7"
        let mut families: Vec<_> = INDEXED_BUTTONS.iter().collect();
        families.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        for (prefix, make) in families {
            if let Some(index) = name.strip_prefix(prefix).and_then(parse_one_based) {
                if index < MAX_INDEX {
                    return Ok(make(index));
                }
            }
        }

        Err(unknown())
    }
}

/// Logical identity of a knob, fader or other continuous control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContinuousId {
    Fader(u8),
    Knob(u8),
    MasterFader,
    MasterKnob,
    Tempo,
    Jog,
    Crossfader,
    Touchstrip,
}

const NAMED_CONTINUOUS: &[(&str, ContinuousId)] = &[
    ("master_fader", ContinuousId::MasterFader),
    ("master_knob", ContinuousId::MasterKnob),
    ("tempo", ContinuousId::Tempo),
    ("jog", ContinuousId::Jog),
    ("crossfader", ContinuousId::Crossfader),
    ("touchstrip", ContinuousId::Touchstrip),
];

impl ContinuousId {
    /// Index within its family, `None` for named controls
    pub fn index(&self) -> Option<u8> {
        match *self {
            ContinuousId::Fader(i) | ContinuousId::Knob(i) => Some(i),
            _ => None,
        }
    }

    /// The control `n` places further along the same family
    pub fn offset(self, n: u8) -> Option<Self> {
        let bounded = |i: u8| i.checked_add(n).filter(|i| *i < MAX_INDEX);
        match self {
            ContinuousId::Fader(i) => bounded(i).map(ContinuousId::Fader),
            ContinuousId::Knob(i) => bounded(i).map(ContinuousId::Knob),
            _ => None,
        }
    }
}

impl fmt::Display for ContinuousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ContinuousId::Fader(i) => write!(f, "fader{}", i + 1),
            ContinuousId::Knob(i) => write!(f, "knob{}", i + 1),
            other => {
                let name = NAMED_CONTINUOUS
                    .iter()
                    .find(|(_, id)| *id == other)
                    .map(|(name, _)| *name)
                    .unwrap_or("continuous");
                f.write_str(name)
            }
        }
    }
}

impl FromStr for ContinuousId {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();

        if let Some((_, id)) = NAMED_CONTINUOUS.iter().find(|(n, _)| *n == name) {
            return Ok(*id);
        }

        let indexed = name
            .strip_prefix("fader")
            .and_then(parse_one_based)
            .map(ContinuousId::Fader)
            .or_else(|| {
                name.strip_prefix("knob")
                    .and_then(parse_one_based)
                    .map(ContinuousId::Knob)
            });

        indexed
            .filter(|id| id.index().map_or(false, |i| i < MAX_INDEX))
            .ok_or_else(|| SurfaceError::UnknownControl(s.to_string()))
    }
}

/// Any logical control a layout row or binding can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlId {
    Button(ButtonId),
    Continuous(ContinuousId),
}

impl From<ButtonId> for ControlId {
    fn from(id: ButtonId) -> Self {
        ControlId::Button(id)
    }
}

impl From<ContinuousId> for ControlId {
    fn from(id: ContinuousId) -> Self {
        ControlId::Continuous(id)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlId::Button(id) => id.fmt(f),
            ControlId::Continuous(id) => id.fmt(f),
        }
    }
}

impl FromStr for ControlId {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<ButtonId>()
            .map(ControlId::Button)
            .or_else(|_| s.parse::<ContinuousId>().map(ControlId::Continuous))
    }
}

/// Parse a 1-based number into a 0-based index
fn parse_one_based(s: &str) -> Option<u8> {
    s.parse::<u8>().ok()?.checked_sub(1)
}

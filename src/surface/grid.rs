//! Pad grid: raw note translation and per-pad press tracking

use std::collections::HashSet;

use tracing::{debug, trace};

use super::button::{ButtonState, PressState};
use super::output::OutputAddress;
use crate::error::SurfaceError;

/// Number of addressable grid notes
pub const GRID_NOTES: usize = 128;

/// A pad on the grid; row 0 is the bottom row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPad {
    /// Translated grid note: `row * columns + column`
    pub index: u8,
    pub row: u8,
    pub column: u8,
}

/// Translation between raw hardware notes and grid pads
#[derive(Debug, Clone)]
pub struct GridLayout {
    channel: u8,
    rows: u8,
    columns: u8,
    raw_to_pad: [Option<u8>; GRID_NOTES],
    pad_to_raw: Vec<u8>,
}

impl GridLayout {
    /// Grid whose notes count up from `start_note`, bottom-left first
    pub fn sequential(channel: u8, rows: u8, columns: u8, start_note: u8) -> Result<Self, SurfaceError> {
        let count = rows as usize * columns as usize;
        let notes: Vec<u8> = (0..count)
            .map(|i| start_note as usize + i)
            .filter(|n| *n < GRID_NOTES)
            .map(|n| n as u8)
            .collect();
        if notes.len() != count {
            return Err(SurfaceError::InvalidLayout(format!(
                "grid of {}x{} starting at note {} runs past note 127",
                rows, columns, start_note
            )));
        }
        Self::from_notes(channel, rows, columns, &notes)
    }

    /// Grid with an explicit raw note per pad, in pad index order
    pub fn from_notes(channel: u8, rows: u8, columns: u8, notes: &[u8]) -> Result<Self, SurfaceError> {
        let count = rows as usize * columns as usize;
        if count == 0 || count > GRID_NOTES {
            return Err(SurfaceError::InvalidLayout(format!(
                "grid must have between 1 and {} pads, got {}x{}",
                GRID_NOTES, rows, columns
            )));
        }
        if channel > 15 {
            return Err(SurfaceError::InvalidLayout(format!(
                "grid channel {} is out of range",
                channel + 1
            )));
        }
        if notes.len() != count {
            return Err(SurfaceError::InvalidLayout(format!(
                "grid of {}x{} needs {} notes, got {}",
                rows,
                columns,
                count,
                notes.len()
            )));
        }

        let mut raw_to_pad = [None; GRID_NOTES];
        for (index, &note) in notes.iter().enumerate() {
            let slot = raw_to_pad.get_mut(note as usize).ok_or_else(|| {
                SurfaceError::InvalidLayout(format!("grid note {} is above 127", note))
            })?;
            if slot.is_some() {
                return Err(SurfaceError::InvalidLayout(format!(
                    "grid note {} is assigned to more than one pad",
                    note
                )));
            }
            *slot = Some(index as u8);
        }

        Ok(Self {
            channel,
            rows,
            columns,
            raw_to_pad,
            pad_to_raw: notes.to_vec(),
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.pad_to_raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pad_to_raw.is_empty()
    }

    /// Pad addressed by a raw hardware note, if it belongs to the grid
    pub fn translate(&self, raw_note: u8) -> Option<GridPad> {
        let index = (*self.raw_to_pad.get(raw_note as usize)?)?;
        self.pad(index)
    }

    /// Pad by translated index
    pub fn pad(&self, index: u8) -> Option<GridPad> {
        if index as usize >= self.len() {
            return None;
        }
        Some(GridPad {
            index,
            row: index / self.columns,
            column: index % self.columns,
        })
    }

    /// Pad at a row/column position
    pub fn at(&self, row: u8, column: u8) -> Option<GridPad> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.pad(row * self.columns + column)
    }

    /// Raw hardware note of a pad
    pub fn raw_note(&self, index: u8) -> Option<u8> {
        self.pad_to_raw.get(index as usize).copied()
    }

    /// Raw notes the grid occupies, used for overlap checks
    pub fn raw_notes(&self) -> HashSet<u8> {
        self.pad_to_raw.iter().copied().collect()
    }

    /// Feedback address lighting a pad
    pub fn light(&self, index: u8) -> Option<OutputAddress> {
        self.raw_note(index).map(|note| OutputAddress::note(self.channel, note))
    }

    pub fn pads(&self) -> impl Iterator<Item = GridPad> + '_ {
        (0..self.len() as u8).filter_map(move |index| self.pad(index))
    }
}

/// Press tracking for one grid note
#[derive(Debug, Clone, Default)]
pub struct GridNote {
    press: PressState,
    /// Velocity of the most recent press
    velocity: u8,
}

impl GridNote {
    pub fn state(&self) -> ButtonState {
        self.press.state()
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn is_consumed(&self) -> bool {
        self.press.is_consumed()
    }
}

/// State change produced by raw grid input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTransition {
    Down { pad: GridPad, velocity: u8, epoch: u64 },
    Up { pad: GridPad },
}

/// Grid of pads owned by a surface
#[derive(Debug, Clone)]
pub struct Grid {
    layout: GridLayout,
    notes: Vec<GridNote>,
}

impl Grid {
    pub fn new(layout: GridLayout) -> Self {
        let notes = vec![GridNote::default(); layout.len()];
        Self { layout, notes }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn note(&self, index: u8) -> Option<&GridNote> {
        self.notes.get(index as usize)
    }

    /// Velocity of the last press of a pad
    pub fn velocity(&self, index: u8) -> Option<u8> {
        self.note(index).map(GridNote::velocity)
    }

    /// Feed a raw note with its velocity (0 releases)
    ///
    /// Returns `None` for notes outside the grid, repeated presses, stray
    /// releases and consumed releases.
    pub fn input(&mut self, raw_note: u8, velocity: u8) -> Option<GridTransition> {
        let pad = self.layout.translate(raw_note)?;
        let note = self.notes.get_mut(pad.index as usize)?;

        if velocity > 0 {
            let epoch = note.press.press()?;
            note.velocity = velocity;
            debug!("Grid pad {} ({},{}) down v:{}", pad.index, pad.row, pad.column, velocity);
            Some(GridTransition::Down { pad, velocity, epoch })
        } else if note.press.release() {
            debug!("Grid pad {} up", pad.index);
            Some(GridTransition::Up { pad })
        } else {
            trace!("Grid pad {} release suppressed", pad.index);
            None
        }
    }

    /// Long-press check fired for a pad; returns the pad when LONG applies
    pub fn long_press_elapsed(&mut self, index: u8, epoch: u64) -> Option<GridPad> {
        let pad = self.layout.pad(index)?;
        let note = self.notes.get_mut(index as usize)?;
        note.press.long_press_elapsed(epoch).then_some(pad)
    }

    /// Swallow the next release of a held pad
    pub fn set_consumed(&mut self, index: u8) -> bool {
        self.notes
            .get_mut(index as usize)
            .map_or(false, |note| note.press.set_consumed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_8x8() -> Grid {
        Grid::new(GridLayout::sequential(0, 8, 8, 36).unwrap())
    }

    #[test]
    fn test_sequential_translation() {
        let layout = GridLayout::sequential(0, 8, 8, 36).unwrap();
        assert_eq!(layout.translate(36), Some(GridPad { index: 0, row: 0, column: 0 }));
        assert_eq!(layout.translate(45), Some(GridPad { index: 9, row: 1, column: 1 }));
        assert_eq!(layout.translate(99), Some(GridPad { index: 63, row: 7, column: 7 }));
        assert_eq!(layout.translate(35), None);
        assert_eq!(layout.translate(100), None);
        assert_eq!(layout.raw_note(9), Some(45));
        assert_eq!(layout.at(1, 1).map(|p| p.index), Some(9));
    }

    #[test]
    fn test_explicit_note_list() {
        // Launchpad-style rows of ten
        let notes: Vec<u8> = (1..=2).flat_map(|row| (1..=2).map(move |col| row * 10 + col)).collect();
        let layout = GridLayout::from_notes(0, 2, 2, &notes).unwrap();
        assert_eq!(layout.translate(11).map(|p| p.index), Some(0));
        assert_eq!(layout.translate(22), Some(GridPad { index: 3, row: 1, column: 1 }));
        assert_eq!(layout.translate(13), None);
        assert_eq!(layout.light(3), Some(OutputAddress::note(0, 22)));
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(GridLayout::sequential(0, 8, 8, 100).is_err());
        assert!(GridLayout::from_notes(0, 1, 2, &[5, 5]).is_err());
        assert!(GridLayout::from_notes(0, 1, 2, &[5]).is_err());
        assert!(GridLayout::from_notes(0, 0, 4, &[]).is_err());
        assert!(GridLayout::from_notes(16, 1, 1, &[5]).is_err());
    }

    #[test]
    fn test_press_release_keeps_velocity() {
        let mut grid = grid_8x8();
        let down = grid.input(45, 90);
        assert!(matches!(down, Some(GridTransition::Down { velocity: 90, .. })));
        // Repeated non-zero velocity while held
        assert_eq!(grid.input(45, 70), None);

        let up = grid.input(45, 0);
        assert!(matches!(up, Some(GridTransition::Up { pad }) if pad.index == 9));
        assert_eq!(grid.velocity(9), Some(90));
        assert_eq!(grid.note(9).unwrap().state(), ButtonState::Up);
    }

    #[test]
    fn test_long_press_only_for_current_press() {
        let mut grid = grid_8x8();
        let Some(GridTransition::Down { epoch: first, .. }) = grid.input(36, 100) else {
            panic!("expected a press");
        };
        grid.input(36, 0);
        let Some(GridTransition::Down { epoch: second, .. }) = grid.input(36, 100) else {
            panic!("expected a press");
        };

        assert_eq!(grid.long_press_elapsed(0, first), None);
        assert!(grid.long_press_elapsed(0, second).is_some());
        assert_eq!(grid.note(0).unwrap().state(), ButtonState::Long);
    }

    #[test]
    fn test_consumed_release() {
        let mut grid = grid_8x8();
        grid.input(40, 100);
        assert!(grid.set_consumed(4));
        assert_eq!(grid.input(40, 0), None);
        grid.input(40, 100);
        assert!(matches!(grid.input(40, 0), Some(GridTransition::Up { .. })));
    }

    #[test]
    fn test_stray_release_is_ignored() {
        let mut grid = grid_8x8();
        assert_eq!(grid.input(36, 0), None);
        assert_eq!(grid.input(20, 100), None);
    }
}

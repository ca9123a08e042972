//! Console behaviors - log interactions and mirror them on the lights
//!
//! Useful for trying a layout on real hardware before any application
//! logic exists.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use super::{Behavior, Mode, View};
use crate::surface::button::ButtonEvent;
use crate::surface::grid::GridPad;
use crate::surface::ids::ControlId;

/// Mode that latches mode buttons and echoes knob positions
pub struct ConsoleMode {
    name: String,
    /// Fixed light values from configuration
    lights: HashMap<ControlId, i32>,
    knobs: BTreeMap<u8, u16>,
    latched: BTreeSet<u8>,
    activations: u32,
}

impl ConsoleMode {
    pub fn new(name: impl Into<String>, lights: HashMap<ControlId, i32>) -> Self {
        Self {
            name: name.into(),
            lights,
            knobs: BTreeMap::new(),
            latched: BTreeSet::new(),
            activations: 0,
        }
    }

    /// How often the mode has been activated
    pub fn activations(&self) -> u32 {
        self.activations
    }
}

impl Behavior for ConsoleMode {
    fn on_activate(&mut self) {
        self.activations += 1;
        info!("🎛️  Mode '{}' activated", self.name);
    }

    fn on_deactivate(&mut self) {
        debug!("Mode '{}' deactivated", self.name);
    }
}

impl Mode for ConsoleMode {
    fn feedback(&self, control: ControlId) -> Option<i32> {
        self.lights.get(&control).copied()
    }

    fn button_feedback(&self, index: u8) -> Option<i32> {
        Some(if self.latched.contains(&index) { 127 } else { 0 })
    }

    fn knob_feedback(&self, index: u8) -> Option<i32> {
        self.knobs.get(&index).map(|v| *v as i32)
    }

    fn on_button(&mut self, index: u8, event: ButtonEvent) {
        info!("🎮 Mode '{}' button {} {:?}", self.name, index + 1, event);
        if event == ButtonEvent::Down && !self.latched.remove(&index) {
            self.latched.insert(index);
        }
    }

    fn on_knob(&mut self, index: u8, value: u16) {
        debug!("Mode '{}' knob {} -> {}", self.name, index + 1, value);
        self.knobs.insert(index, value);
    }
}

/// View that lights pads while held and latches them on long press
pub struct ConsoleView {
    name: String,
    held: HashMap<u8, u8>,
    latched: BTreeSet<u8>,
}

impl ConsoleView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: HashMap::new(),
            latched: BTreeSet::new(),
        }
    }
}

impl Behavior for ConsoleView {
    fn on_activate(&mut self) {
        info!("🟩 View '{}' activated", self.name);
    }

    fn on_deactivate(&mut self) {
        self.held.clear();
        debug!("View '{}' deactivated", self.name);
    }
}

impl View for ConsoleView {
    fn on_grid_note(&mut self, pad: GridPad, velocity: u8) {
        info!(
            "🎹 View '{}' pad {} (row {}, col {}) v:{}",
            self.name,
            pad.index,
            pad.row + 1,
            pad.column + 1,
            velocity
        );
        if velocity > 0 {
            self.held.insert(pad.index, velocity);
        } else {
            self.held.remove(&pad.index);
        }
    }

    fn on_grid_note_long_press(&mut self, pad: GridPad) {
        if !self.latched.remove(&pad.index) {
            self.latched.insert(pad.index);
        }
        info!("📌 View '{}' pad {} long press", self.name, pad.index);
    }

    fn pad_light(&self, pad: GridPad) -> Option<i32> {
        if let Some(velocity) = self.held.get(&pad.index) {
            return Some(*velocity as i32);
        }
        Some(if self.latched.contains(&pad.index) { 127 } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ids::ButtonId;

    #[test]
    fn test_console_mode_feedback() {
        let lights = HashMap::from([(ControlId::Button(ButtonId::Play), 64)]);
        let mut mode = ConsoleMode::new("mix", lights);
        mode.on_activate();
        assert_eq!(mode.activations(), 1);

        assert_eq!(mode.feedback(ControlId::Button(ButtonId::Play)), Some(64));
        assert_eq!(mode.feedback(ControlId::Button(ButtonId::Stop)), None);

        mode.on_button(2, ButtonEvent::Down);
        mode.on_button(2, ButtonEvent::Up);
        assert_eq!(mode.button_feedback(2), Some(127));
        mode.on_button(2, ButtonEvent::Down);
        assert_eq!(mode.button_feedback(2), Some(0));

        assert_eq!(mode.knob_feedback(0), None);
        mode.on_knob(0, 42);
        assert_eq!(mode.knob_feedback(0), Some(42));
    }

    #[test]
    fn test_console_view_pad_lights() {
        let mut view = ConsoleView::new("pads");
        let pad = GridPad { index: 5, row: 0, column: 5 };

        view.on_grid_note(pad, 90);
        assert_eq!(view.pad_light(pad), Some(90));
        view.on_grid_note(pad, 0);
        assert_eq!(view.pad_light(pad), Some(0));

        view.on_grid_note_long_press(pad);
        assert_eq!(view.pad_light(pad), Some(127));
    }
}

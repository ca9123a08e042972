//! Primary unit plus extenders
//!
//! Mode changes made on any unit are mirrored onto every sibling inside the
//! same processing pass, so all units always show the same mode.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::ids::{ButtonId, ControlId};
use super::scheduler::ScheduledTask;
use super::ControlSurface;
use crate::command::Command;
use crate::drivers::DriverRegistry;

/// Surfaces that act as one combined controller
pub struct SurfaceGroup {
    surfaces: Vec<ControlSurface>,
    drivers: DriverRegistry,
}

impl SurfaceGroup {
    pub fn new(drivers: DriverRegistry) -> Self {
        Self {
            surfaces: Vec::new(),
            drivers,
        }
    }

    /// Add a unit; returns its index
    pub fn add(&mut self, surface: ControlSurface) -> usize {
        self.surfaces.push(surface);
        self.surfaces.len() - 1
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn surface(&self, index: usize) -> Option<&ControlSurface> {
        self.surfaces.get(index)
    }

    pub fn surface_mut(&mut self, index: usize) -> Option<&mut ControlSurface> {
        self.surfaces.get_mut(index)
    }

    pub fn surfaces(&self) -> &[ControlSurface] {
        &self.surfaces
    }

    /// Index of the surface with the given name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.surfaces.iter().position(|s| s.name() == name)
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn handle_midi(&mut self, index: usize, raw: &[u8]) {
        let Some(surface) = self.surfaces.get_mut(index) else {
            warn!("MIDI for unknown surface #{}", index);
            return;
        };
        surface.handle_midi(raw, &self.drivers);
        self.propagate(index);
    }

    pub fn handle_task(&mut self, index: usize, task: ScheduledTask) {
        let Some(surface) = self.surfaces.get_mut(index) else {
            warn!("Task for unknown surface #{}", index);
            return;
        };
        surface.handle_task(task, &self.drivers);
        self.propagate(index);
    }

    pub fn trigger(&mut self, index: usize, button: ButtonId) {
        let Some(surface) = self.surfaces.get_mut(index) else {
            warn!("Trigger for unknown surface #{}", index);
            return;
        };
        surface.trigger(button, &self.drivers);
        self.propagate(index);
    }

    /// Connect every unit
    pub fn start(&mut self) {
        for surface in &mut self.surfaces {
            surface.start();
        }
    }

    /// Periodic refresh of every unit
    pub fn request_flush(&mut self) {
        for surface in &mut self.surfaces {
            surface.request_flush();
        }
    }

    /// Apply new bindings everywhere and force a full refresh
    pub fn rebind(&mut self, bindings: &HashMap<ControlId, Command>) {
        for surface in &mut self.surfaces {
            surface.bind_commands(bindings);
            surface.invalidate();
        }
        self.drivers.sync_all();
    }

    /// Mirror mode changes made on `origin` onto its siblings
    fn propagate(&mut self, origin: usize) {
        let Some(changes) = self.surfaces.get_mut(origin).map(ControlSurface::take_mode_changes) else {
            return;
        };
        if changes.is_empty() {
            return;
        }
        for (index, sibling) in self.surfaces.iter_mut().enumerate() {
            if index == origin {
                continue;
            }
            debug!("Mirroring {} mode change(s) onto '{}'", changes.len(), sibling.name());
            for change in &changes {
                sibling.apply_mode_change(change);
            }
        }
    }
}

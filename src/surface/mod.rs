//! Control surface engine
//!
//! A [`ControlSurface`] owns everything about one physical unit: its
//! buttons, continuous controls and pad grid, its modes and views, and the
//! output cache standing between feedback and the hardware.
//!
//! All entry points (`handle_midi`, `handle_task`, `trigger`) run to
//! completion on the caller's thread; timers come back in through
//! `handle_task`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, trace};

use crate::command::{self, Command, CommandContext, CommandInput};
use crate::control_mapping::ControlLayout;
use crate::device::MidiSink;
use crate::drivers::DriverRegistry;
use crate::midi::MidiMessage;
use crate::modes::{ModeChange, ModeManager, ViewManager};

pub mod button;
pub mod continuous;
pub mod grid;
pub mod group;
pub mod ids;
pub mod keep_alive;
pub mod output;
pub mod scheduler;


use button::{Button, ButtonEvent, DEFAULT_LONG_PRESS_MS};
use continuous::ContinuousControl;
use grid::{Grid, GridLayout, GridTransition};
use ids::{ButtonId, ContinuousId, ControlId};
use keep_alive::KeepAlive;
use output::{OutputAddress, OutputCache, OutputKind};
use scheduler::{isolate, FlushScheduler, ScheduledTask, TaskScheduler};

pub use group::SurfaceGroup;

/// Default delay between a flush request and its execution
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 5;

/// Everything needed to build a surface
pub struct SurfaceSetup {
    pub name: String,
    /// Start index of this unit within the combined track set
    pub extender_offset: u8,
    pub layout: ControlLayout,
    pub grid: Option<GridLayout>,
    pub long_press: Duration,
    pub flush_delay: Duration,
    pub keep_alive: Option<KeepAlive>,
}

impl SurfaceSetup {
    pub fn new(name: impl Into<String>, layout: ControlLayout) -> Self {
        Self {
            name: name.into(),
            extender_offset: 0,
            layout,
            grid: None,
            long_press: Duration::from_millis(DEFAULT_LONG_PRESS_MS),
            flush_delay: Duration::from_millis(DEFAULT_FLUSH_DELAY_MS),
            keep_alive: None,
        }
    }
}

/// What an input address drives
#[derive(Debug, Clone, Copy)]
enum Target {
    Button(ButtonId),
    Continuous(ContinuousId),
}

/// Runtime state of one physical controller unit
pub struct ControlSurface {
    name: String,
    extender_offset: u8,
    long_press: Duration,
    inputs: HashMap<OutputAddress, Target>,
    buttons: BTreeMap<ButtonId, Button>,
    continuous: BTreeMap<ContinuousId, ContinuousControl>,
    grid: Option<Grid>,
    modes: ModeManager,
    views: ViewManager,
    cache: OutputCache,
    flush: FlushScheduler,
    keep_alive: Option<KeepAlive>,
    timer_failures: u64,
    scheduler: Box<dyn TaskScheduler>,
    sink: Box<dyn MidiSink>,
}

impl ControlSurface {
    /// Build a surface and register its outputs
    ///
    /// Fails on layouts the hardware cannot honor; nothing is written to
    /// the device here.
    pub fn new(setup: SurfaceSetup, scheduler: Box<dyn TaskScheduler>, sink: Box<dyn MidiSink>) -> Result<Self> {
        let mut cache = OutputCache::new();
        let mut inputs = HashMap::new();
        let mut buttons = BTreeMap::new();
        let mut continuous = BTreeMap::new();

        if let Some(grid) = &setup.grid {
            setup.layout.check_grid_overlap(grid)?;
            for pad in grid.pads() {
                if let Some(light) = grid.light(pad.index) {
                    cache.register(light)?;
                }
            }
        }

        for entry in setup.layout.entries() {
            if let Some(feedback) = entry.feedback {
                cache.register(feedback)?;
            }
            match entry.control {
                ControlId::Button(id) => {
                    buttons.insert(id, Button::new(id, entry.feedback));
                    inputs.insert(entry.input, Target::Button(id));
                }
                ControlId::Continuous(id) => {
                    continuous.insert(id, ContinuousControl::new(id, entry.feedback));
                    inputs.insert(entry.input, Target::Continuous(id));
                }
            }
        }

        info!(
            "🎚️  Surface '{}' ready: {} buttons, {} continuous controls, {} pads (offset {})",
            setup.name,
            buttons.len(),
            continuous.len(),
            setup.grid.as_ref().map_or(0, GridLayout::len),
            setup.extender_offset
        );

        Ok(Self {
            name: setup.name,
            extender_offset: setup.extender_offset,
            long_press: setup.long_press,
            inputs,
            buttons,
            continuous,
            grid: setup.grid.map(Grid::new),
            modes: ModeManager::new("mode"),
            views: ViewManager::new(),
            cache,
            flush: FlushScheduler::new(setup.flush_delay),
            keep_alive: setup.keep_alive,
            timer_failures: 0,
            scheduler,
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extender_offset(&self) -> u8 {
        self.extender_offset
    }

    pub fn button(&self, id: ButtonId) -> Option<&Button> {
        self.buttons.get(&id)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.buttons.values()
    }

    pub fn continuous(&self, id: ContinuousId) -> Option<&ContinuousControl> {
        self.continuous.get(&id)
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn modes(&self) -> &ModeManager {
        &self.modes
    }

    pub fn modes_mut(&mut self) -> &mut ModeManager {
        &mut self.modes
    }

    pub fn views(&self) -> &ViewManager {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ViewManager {
        &mut self.views
    }

    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }

    pub fn flush_scheduler(&self) -> &FlushScheduler {
        &self.flush
    }

    pub fn keep_alive(&self) -> Option<&KeepAlive> {
        self.keep_alive.as_ref()
    }

    /// Bind commands by control id; controls missing from the map are unbound
    pub fn bind_commands(&mut self, bindings: &HashMap<ControlId, Command>) {
        let mut bound = 0;
        for (id, button) in &mut self.buttons {
            let command = bindings.get(&ControlId::Button(*id)).cloned();
            bound += command.is_some() as usize;
            button.bind(command);
        }
        for (id, control) in &mut self.continuous {
            let command = bindings.get(&ControlId::Continuous(*id)).cloned();
            bound += command.is_some() as usize;
            control.bind(command);
        }
        for control in bindings.keys() {
            let present = match control {
                ControlId::Button(id) => self.buttons.contains_key(id),
                ControlId::Continuous(id) => self.continuous.contains_key(id),
            };
            if !present {
                debug!("Surface '{}' has no control '{}' to bind", self.name, control);
            }
        }
        debug!("Surface '{}': {} controls bound", self.name, bound);
    }

    /// (Re)connect: forget the hardware state and push everything again
    pub fn start(&mut self) {
        info!("🔌 Surface '{}' starting", self.name);
        self.cache.invalidate();
        if let Some(keep_alive) = &mut self.keep_alive {
            keep_alive.start(self.sink.as_mut(), self.scheduler.as_ref());
        }
        self.request_flush();
    }

    /// Forget cached outputs, e.g. after a configuration reload
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
        self.request_flush();
    }

    pub fn request_flush(&mut self) {
        self.flush.request(self.scheduler.as_ref());
    }

    /// Process one raw MIDI message from the hardware
    pub fn handle_midi(&mut self, raw: &[u8], drivers: &DriverRegistry) {
        if let Some(keep_alive) = &mut self.keep_alive {
            if keep_alive.acknowledge(raw) {
                return;
            }
        }

        let Some(message) = MidiMessage::parse(raw) else {
            return;
        };
        trace!("{} <- {}", self.name, message);

        match message {
            MidiMessage::NoteOn { channel, note, velocity } => self.note_input(channel, note, velocity, drivers),
            MidiMessage::NoteOff { channel, note, .. } => self.note_input(channel, note, 0, drivers),
            MidiMessage::ControlChange { channel, cc, value } => {
                self.value_input(OutputAddress::cc(channel, cc), value as u16, drivers)
            }
            MidiMessage::PitchBend { channel, value } => {
                self.value_input(OutputAddress::pitch_bend(channel), value, drivers)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                let address = OutputAddress { kind: OutputKind::PolyPressure, channel, control: note };
                self.value_input(address, pressure as u16, drivers)
            }
            MidiMessage::ProgramChange { .. } | MidiMessage::ChannelPressure { .. } | MidiMessage::SysEx { .. } => {
                trace!("{}: ignoring {}", self.name, message);
                return;
            }
        }

        self.request_flush();
    }

    /// Process a task previously handed to the scheduler
    ///
    /// Errors and panics raised by the callback are logged and counted; the
    /// surface keeps processing input and later tasks.
    pub fn handle_task(&mut self, task: ScheduledTask, drivers: &DriverRegistry) {
        if let ScheduledTask::Flush { generation } = task {
            if !self.flush.is_due(generation) {
                trace!("{}: skipping superseded flush {}", self.name, generation);
                return;
            }
            let label = format!("Flush of '{}'", self.name);
            let ok = isolate(&label, || self.refresh(drivers));
            self.flush.record(ok);
            return;
        }

        let label = format!("{:?} on '{}'", task, self.name);
        let ok = isolate(&label, || {
            self.run_timer(task, drivers);
            Ok(())
        });
        if !ok {
            self.timer_failures += 1;
        }
    }

    /// Timer callbacks that failed or panicked
    pub fn timer_failures(&self) -> u64 {
        self.timer_failures
    }

    fn run_timer(&mut self, task: ScheduledTask, drivers: &DriverRegistry) {
        match task {
            ScheduledTask::LongPress { button, epoch } => {
                let Some(state) = self.buttons.get_mut(&button) else {
                    return;
                };
                if state.press_state_mut().long_press_elapsed(epoch) {
                    let velocity = state.last_value();
                    debug!("{}: {} long press", self.name, button);
                    self.fire(button, ButtonEvent::Long, velocity, drivers);
                    self.request_flush();
                }
            }
            ScheduledTask::GridLongPress { pad, epoch } => {
                let Some(pad) = self.grid.as_mut().and_then(|grid| grid.long_press_elapsed(pad, epoch)) else {
                    return;
                };
                match self.views.current_mut() {
                    Some(view) => view.on_grid_note_long_press(pad),
                    None => debug!("{}: no view for pad {} long press", self.name, pad.index),
                }
                self.request_flush();
            }
            ScheduledTask::KeepAlive => {
                if let Some(keep_alive) = &mut self.keep_alive {
                    keep_alive.tick(self.sink.as_mut(), self.scheduler.as_ref());
                }
            }
            ScheduledTask::Flush { .. } => {}
        }
    }

    /// Fire DOWN then UP for a button without touching its press state
    pub fn trigger(&mut self, id: ButtonId, drivers: &DriverRegistry) {
        if !self.buttons.contains_key(&id) {
            debug!("{}: cannot trigger unknown button {}", self.name, id);
            return;
        }
        self.fire(id, ButtonEvent::Down, 127, drivers);
        self.fire(id, ButtonEvent::Up, 0, drivers);
        self.request_flush();
    }

    /// Swallow the next release of a held button
    pub fn set_consumed(&mut self, id: ButtonId) -> bool {
        self.buttons
            .get_mut(&id)
            .map_or(false, |button| button.press_state_mut().set_consumed())
    }

    /// Swallow the next release of a held pad
    pub fn set_pad_consumed(&mut self, index: u8) -> bool {
        self.grid.as_mut().map_or(false, |grid| grid.set_consumed(index))
    }

    /// Mode changes made on this surface since the last call
    pub fn take_mode_changes(&mut self) -> Vec<ModeChange> {
        self.modes.take_journal()
    }

    /// Mirror a mode change made on a sibling surface
    pub fn apply_mode_change(&mut self, change: &ModeChange) {
        self.modes.apply(change);
        self.request_flush();
    }

    fn note_input(&mut self, channel: u8, note: u8, velocity: u8, drivers: &DriverRegistry) {
        if let Some(grid) = &mut self.grid {
            if grid.layout().channel() == channel && grid.layout().translate(note).is_some() {
                match grid.input(note, velocity) {
                    Some(GridTransition::Down { pad, velocity, epoch }) => {
                        self.scheduler
                            .schedule(ScheduledTask::GridLongPress { pad: pad.index, epoch }, self.long_press);
                        match self.views.current_mut() {
                            Some(view) => view.on_grid_note(pad, velocity),
                            None => debug!("{}: no view for pad {}", self.name, pad.index),
                        }
                    }
                    Some(GridTransition::Up { pad }) => {
                        if let Some(view) = self.views.current_mut() {
                            view.on_grid_note(pad, 0);
                        }
                    }
                    None => {}
                }
                return;
            }
        }
        match self.inputs.get(&OutputAddress::note(channel, note)).copied() {
            Some(Target::Button(id)) => self.button_input(id, velocity, drivers),
            Some(Target::Continuous(id)) => self.continuous_input(id, velocity as u16, drivers),
            None => trace!("{}: unmapped note {} on channel {}", self.name, note, channel + 1),
        }
    }

    fn value_input(&mut self, address: OutputAddress, value: u16, drivers: &DriverRegistry) {
        match self.inputs.get(&address).copied() {
            Some(Target::Button(id)) => self.button_input(id, value.min(127) as u8, drivers),
            Some(Target::Continuous(id)) => self.continuous_input(id, value, drivers),
            None => trace!("{}: unmapped input {}", self.name, address),
        }
    }

    fn button_input(&mut self, id: ButtonId, value: u8, drivers: &DriverRegistry) {
        let Some(button) = self.buttons.get_mut(&id) else {
            return;
        };

        if value > 0 {
            let Some(epoch) = button.press_state_mut().press() else {
                trace!("{}: {} already held", self.name, id);
                return;
            };
            button.record_press_value(value);
            self.scheduler
                .schedule(ScheduledTask::LongPress { button: id, epoch }, self.long_press);
            self.fire(id, ButtonEvent::Down, value, drivers);
        } else if button.press_state_mut().release() {
            self.fire(id, ButtonEvent::Up, 0, drivers);
        } else {
            debug!("{}: {} release suppressed", self.name, id);
        }
    }

    fn continuous_input(&mut self, id: ContinuousId, value: u16, drivers: &DriverRegistry) {
        let Some(control) = self.continuous.get_mut(&id) else {
            return;
        };
        if !control.record(value) {
            return;
        }
        let Some(command) = control.command().cloned() else {
            trace!("{}: {} -> {} (unbound)", self.name, id, value);
            return;
        };
        let mut ctx = CommandContext::new(
            &self.name,
            ControlId::Continuous(id),
            CommandInput::Value(value),
            self.extender_offset,
            &mut self.modes,
            &mut self.views,
            &mut self.buttons,
        );
        command::dispatch(&command, &mut ctx, drivers);
    }

    fn fire(&mut self, id: ButtonId, event: ButtonEvent, velocity: u8, drivers: &DriverRegistry) {
        let Some(command) = self.buttons.get(&id).and_then(|b| b.command().cloned()) else {
            trace!("{}: {} {:?} (unbound)", self.name, id, event);
            return;
        };
        let mut ctx = CommandContext::new(
            &self.name,
            ControlId::Button(id),
            CommandInput::Button { event, velocity },
            self.extender_offset,
            &mut self.modes,
            &mut self.views,
            &mut self.buttons,
        );
        command::dispatch(&command, &mut ctx, drivers);
    }

    /// Push current feedback through the output cache
    fn refresh(&mut self, drivers: &DriverRegistry) -> Result<()> {
        let mode = self.modes.current();
        let view = self.views.current();

        for button in self.buttons.values() {
            let Some(light) = button.light() else {
                continue;
            };
            let control = ControlId::Button(button.id());
            let value = mode
                .and_then(|m| m.feedback(control))
                .or_else(|| view.and_then(|v| v.feedback(control)))
                .or_else(|| {
                    button.command().and_then(|c| {
                        command::feedback(c, &self.modes, &self.views, drivers, self.extender_offset)
                    })
                })
                .unwrap_or(0);
            self.cache.update(light, value, self.sink.as_mut());
        }

        for control in self.continuous.values() {
            let Some(address) = control.feedback() else {
                continue;
            };
            let id = ControlId::Continuous(control.id());
            let value = mode.and_then(|m| m.feedback(id)).or_else(|| {
                control.command().and_then(|c| {
                    command::feedback(c, &self.modes, &self.views, drivers, self.extender_offset)
                })
            });
            if let Some(value) = value {
                self.cache.update(address, value, self.sink.as_mut());
            }
        }

        if let Some(grid) = &self.grid {
            for pad in grid.layout().pads() {
                let Some(light) = grid.layout().light(pad.index) else {
                    continue;
                };
                let value = view.and_then(|v| v.pad_light(pad)).unwrap_or(0);
                self.cache.update(light, value, self.sink.as_mut());
            }
        }

        Ok(())
    }
}

//! Commands bound to controls and the dispatcher that runs them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::drivers::DriverRegistry;
use crate::modes::{ModeId, ModeManager, ViewId, ViewManager};
use crate::surface::button::{Button, ButtonEvent};
use crate::surface::ids::{ButtonId, ControlId};

/// What a control does when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Application action executed by a named driver
    Action {
        driver: String,
        action: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Make a mode active
    SelectMode { mode: ModeId },
    /// Show a mode only while the button is held
    MomentaryMode { mode: ModeId },
    /// End a temporary mode, else go back to the previous mode
    RestoreMode,
    SelectView { view: ViewId },
    /// Go back to the previously shown view
    RestoreView,
    /// Select a track; `position` is relative to the unit
    SelectTrack { position: usize },
    /// Forward to the shown mode as button `index` (relative to the unit)
    ModeButton { index: u8 },
    /// Forward to the shown mode as knob `index` (relative to the unit)
    ModeKnob { index: u8 },
}

/// Input a command runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandInput {
    Button { event: ButtonEvent, velocity: u8 },
    Value(u16),
}

impl CommandInput {
    pub fn event(&self) -> Option<ButtonEvent> {
        match self {
            CommandInput::Button { event, .. } => Some(*event),
            CommandInput::Value(_) => None,
        }
    }

    fn is_down(&self) -> bool {
        self.event() == Some(ButtonEvent::Down)
    }
}

/// Surface state a command may read and change while it runs
pub struct CommandContext<'a> {
    /// Name of the surface the input came from
    pub surface: &'a str,
    pub control: ControlId,
    pub input: CommandInput,
    /// Start index of this unit within the combined track set
    pub extender_offset: u8,
    pub modes: &'a mut ModeManager,
    pub views: &'a mut ViewManager,
    buttons: &'a mut BTreeMap<ButtonId, Button>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        surface: &'a str,
        control: ControlId,
        input: CommandInput,
        extender_offset: u8,
        modes: &'a mut ModeManager,
        views: &'a mut ViewManager,
        buttons: &'a mut BTreeMap<ButtonId, Button>,
    ) -> Self {
        Self {
            surface,
            control,
            input,
            extender_offset,
            modes,
            views,
            buttons,
        }
    }

    pub fn is_pressed(&self, id: ButtonId) -> bool {
        self.buttons.get(&id).map_or(false, Button::is_pressed)
    }

    /// Swallow the next release of a held button
    ///
    /// Used by combinations: a command run while SHIFT is held consumes
    /// SHIFT so its own release does nothing.
    pub fn set_consumed(&mut self, id: ButtonId) -> bool {
        self.buttons
            .get_mut(&id)
            .map_or(false, |button| button.press_state_mut().set_consumed())
    }

    /// Unit-relative index shifted into the combined index space
    pub fn absolute(&self, index: u8) -> u8 {
        index.saturating_add(self.extender_offset)
    }
}

/// Run `command` with the context's input
pub fn dispatch(command: &Command, ctx: &mut CommandContext<'_>, drivers: &DriverRegistry) {
    trace!("{} {} -> {:?} ({:?})", ctx.surface, ctx.control, command, ctx.input);

    match command {
        Command::Action { driver, action, params } => {
            drivers.execute(driver, action, params, ctx);
        }
        Command::SelectMode { mode } => {
            if ctx.input.is_down() {
                ctx.modes.set_active(mode);
            }
        }
        Command::MomentaryMode { mode } => match ctx.input.event() {
            Some(ButtonEvent::Down) => {
                ctx.modes.set_temporary(mode);
            }
            Some(ButtonEvent::Up) => {
                if ctx.modes.temporary() == Some(mode) {
                    ctx.modes.clear_temporary();
                }
            }
            _ => {}
        },
        Command::RestoreMode => {
            if ctx.input.is_down() {
                ctx.modes.restore();
            }
        }
        Command::SelectView { view } => {
            if ctx.input.is_down() {
                ctx.views.set_active(view);
            }
        }
        Command::RestoreView => {
            if ctx.input.is_down() {
                ctx.views.restore();
            }
        }
        Command::SelectTrack { position } => {
            if ctx.input.is_down() {
                let absolute = position + ctx.extender_offset as usize;
                debug!("{}: select track {}", ctx.surface, absolute + 1);
                ctx.views.select_track(absolute);
            }
        }
        Command::ModeButton { index } => {
            let index = ctx.absolute(*index);
            match (ctx.input.event(), ctx.modes.current_mut()) {
                (Some(event), Some(mode)) => mode.on_button(index, event),
                (None, _) => debug!("Mode button {} bound to a continuous control", index),
                (_, None) => debug!("No mode shown for button {}", index),
            }
        }
        Command::ModeKnob { index } => {
            let index = ctx.absolute(*index);
            match (ctx.input, ctx.modes.current_mut()) {
                (CommandInput::Value(value), Some(mode)) => mode.on_knob(index, value),
                (CommandInput::Button { .. }, _) => {
                    debug!("Mode knob {} bound to a button", index)
                }
                (_, None) => debug!("No mode shown for knob {}", index),
            }
        }
    }
}

/// State a command reports for its control's light, if any
pub fn feedback(
    command: &Command,
    modes: &ModeManager,
    views: &ViewManager,
    drivers: &DriverRegistry,
    extender_offset: u8,
) -> Option<i32> {
    let lit = |on: bool| Some(if on { 127 } else { 0 });
    match command {
        Command::Action { driver, action, params } => drivers.feedback(driver, action, params),
        Command::SelectMode { mode } => lit(modes.active_or_temp() == Some(mode)),
        Command::MomentaryMode { mode } => lit(modes.temporary() == Some(mode)),
        Command::RestoreMode | Command::RestoreView => None,
        Command::SelectView { view } => lit(views.active() == Some(view)),
        Command::SelectTrack { position } => {
            lit(views.selected_track() == Some(position + extender_offset as usize))
        }
        Command::ModeButton { index } => modes
            .current()
            .and_then(|mode| mode.button_feedback(index.saturating_add(extender_offset))),
        Command::ModeKnob { index } => modes
            .current()
            .and_then(|mode| mode.knob_feedback(index.saturating_add(extender_offset))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{ConsoleMode, ConsoleView, Mode};
    use std::collections::HashMap;

    struct Fixture {
        modes: ModeManager,
        views: ViewManager,
        buttons: BTreeMap<ButtonId, Button>,
        drivers: DriverRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let mut modes = ModeManager::new("mode");
            for name in ["mix", "sends"] {
                modes.register(ModeId::from(name), Box::new(ConsoleMode::new(name, HashMap::new())));
            }
            modes.set_active(&ModeId::from("mix"));

            let mut views = ViewManager::new();
            for name in ["clips", "drums"] {
                views.register(ViewId::from(name), Box::new(ConsoleView::new(name)));
            }
            views.set_active(&ViewId::from("clips"));

            let mut buttons = BTreeMap::new();
            for id in [ButtonId::Shift, ButtonId::Play] {
                buttons.insert(id, Button::new(id, None));
            }

            Self {
                modes,
                views,
                buttons,
                drivers: DriverRegistry::new(),
            }
        }

        fn run(&mut self, command: &Command, input: CommandInput, offset: u8) {
            let mut ctx = CommandContext::new(
                "test",
                ControlId::Button(ButtonId::Play),
                input,
                offset,
                &mut self.modes,
                &mut self.views,
                &mut self.buttons,
            );
            dispatch(command, &mut ctx, &self.drivers);
        }
    }

    fn down() -> CommandInput {
        CommandInput::Button { event: ButtonEvent::Down, velocity: 127 }
    }

    fn up() -> CommandInput {
        CommandInput::Button { event: ButtonEvent::Up, velocity: 0 }
    }

    #[test]
    fn test_momentary_mode() {
        let mut fx = Fixture::new();
        let momentary = Command::MomentaryMode { mode: ModeId::from("sends") };

        fx.run(&momentary, down(), 0);
        assert_eq!(fx.modes.active_or_temp(), Some(&ModeId::from("sends")));
        assert_eq!(
            feedback(&momentary, &fx.modes, &fx.views, &fx.drivers, 0),
            Some(127)
        );

        fx.run(&momentary, up(), 0);
        assert_eq!(fx.modes.active_or_temp(), Some(&ModeId::from("mix")));
        assert_eq!(fx.modes.temporary(), None);
    }

    #[test]
    fn test_select_mode_fires_on_down_only() {
        let mut fx = Fixture::new();
        let select = Command::SelectMode { mode: ModeId::from("sends") };

        fx.run(&select, up(), 0);
        assert_eq!(fx.modes.active(), Some(&ModeId::from("mix")));
        fx.run(&select, down(), 0);
        assert_eq!(fx.modes.active(), Some(&ModeId::from("sends")));

        fx.run(&Command::RestoreMode, down(), 0);
        assert_eq!(fx.modes.active(), Some(&ModeId::from("mix")));
    }

    #[test]
    fn test_restore_view_remembers_track_preference() {
        let mut fx = Fixture::new();
        fx.run(&Command::SelectTrack { position: 2 }, down(), 0);
        fx.run(&Command::SelectView { view: ViewId::from("drums") }, down(), 0);

        fx.run(&Command::RestoreView, up(), 0);
        assert_eq!(fx.views.active(), Some(&ViewId::from("drums")));
        fx.run(&Command::RestoreView, down(), 0);
        assert_eq!(fx.views.active(), Some(&ViewId::from("clips")));
        assert_eq!(fx.views.preferred(2), Some(&ViewId::from("clips")));
    }

    #[test]
    fn test_extender_offset_shifts_indices() {
        let mut fx = Fixture::new();
        fx.run(&Command::ModeButton { index: 1 }, down(), 8);
        let mode = fx.modes.current().unwrap();
        assert_eq!(mode.button_feedback(9), Some(127));
        assert_eq!(mode.button_feedback(1), Some(0));

        fx.run(&Command::ModeKnob { index: 0 }, CommandInput::Value(77), 8);
        assert_eq!(fx.modes.current().unwrap().knob_feedback(8), Some(77));

        let track = Command::SelectTrack { position: 2 };
        fx.run(&track, down(), 8);
        assert_eq!(fx.views.selected_track(), Some(10));
        assert_eq!(feedback(&track, &fx.modes, &fx.views, &fx.drivers, 8), Some(127));
        assert_eq!(feedback(&track, &fx.modes, &fx.views, &fx.drivers, 0), Some(0));
    }

    #[test]
    fn test_context_consumes_held_buttons() {
        let mut fx = Fixture::new();
        fx.buttons.get_mut(&ButtonId::Shift).unwrap().press_state_mut().press();

        let mut ctx = CommandContext::new(
            "test",
            ControlId::Button(ButtonId::Play),
            down(),
            0,
            &mut fx.modes,
            &mut fx.views,
            &mut fx.buttons,
        );
        assert!(ctx.is_pressed(ButtonId::Shift));
        assert!(ctx.set_consumed(ButtonId::Shift));
        assert!(!ctx.set_consumed(ButtonId::Play));
        assert!(!ctx.set_consumed(ButtonId::Stop));
        drop(ctx);

        assert!(!fx.buttons.get_mut(&ButtonId::Shift).unwrap().press_state_mut().release());
    }

    #[test]
    fn test_commands_deserialize_from_yaml() {
        let yaml = r#"
- type: action
  driver: console
  action: toggle
  params: [metronome]
- type: select_view
  view: drums
- type: mode_knob
  index: 3
"#;
        let commands: Vec<Command> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            commands[0],
            Command::Action {
                driver: "console".into(),
                action: "toggle".into(),
                params: vec![Value::from("metronome")],
            }
        );
        assert_eq!(commands[1], Command::SelectView { view: ViewId::from("drums") });
        assert_eq!(commands[2], Command::ModeKnob { index: 3 });
    }

    #[test]
    fn test_unknown_driver_is_ignored() {
        let mut fx = Fixture::new();
        let command = Command::Action {
            driver: "daw".into(),
            action: "play".into(),
            params: vec![],
        };
        fx.run(&command, down(), 0);
        assert_eq!(feedback(&command, &fx.modes, &fx.views, &fx.drivers, 0), None);
    }
}

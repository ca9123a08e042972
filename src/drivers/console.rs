//! Console driver - logs all actions for testing and debugging

use std::collections::HashMap;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::command::{CommandContext, CommandInput};
use crate::drivers::Driver;
use crate::surface::button::ButtonEvent;
use crate::surface::ids::ButtonId;

/// ConsoleDriver logs every action it receives
///
/// It also keeps just enough state to light controls back up:
/// - `toggle` flips on every press
/// - `momentary` is lit while held
/// - any action fed by a knob or fader remembers the last value
///
/// A press made while SHIFT is held consumes SHIFT, so releasing SHIFT
/// afterwards does not fire its own command.
pub struct ConsoleDriver {
    name: String,
    /// Track if driver is initialized
    initialized: RwLock<bool>,
    /// Execution counter for debugging
    execution_count: RwLock<u64>,
    /// Light value per action + params
    state: Mutex<HashMap<String, i32>>,
}

impl ConsoleDriver {
    /// Create a new ConsoleDriver with a given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: RwLock::new(false),
            execution_count: RwLock::new(0),
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn execution_count(&self) -> u64 {
        *self.execution_count.read()
    }

    fn key(action: &str, params: &[Value]) -> String {
        format!("{}:{}", action, Value::Array(params.to_vec()))
    }
}

impl Driver for ConsoleDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        info!("🔌 ConsoleDriver '{}' initializing", self.name);
        *self.initialized.write() = true;
        *self.execution_count.write() = 0;
        Ok(())
    }

    fn execute(&self, action: &str, params: &[Value], ctx: &mut CommandContext<'_>) -> Result<()> {
        if !*self.initialized.read() {
            warn!("⚠️  ConsoleDriver '{}' not initialized, skipping execution", self.name);
            return Ok(());
        }

        let exec_num = {
            let mut count = self.execution_count.write();
            *count += 1;
            *count
        };

        let params_str = if params.is_empty() {
            "(no params)".to_string()
        } else {
            params
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let input_str = match ctx.input {
            CommandInput::Button { event, velocity } => format!("{:?} v:{}", event, velocity),
            CommandInput::Value(value) => format!("value {}", value),
        };

        let shifted = ctx.input.event() == Some(ButtonEvent::Down)
            && ctx.control != ButtonId::Shift.into()
            && ctx.is_pressed(ButtonId::Shift);
        if shifted {
            ctx.set_consumed(ButtonId::Shift);
        }

        info!(
            "🎮 [{}] Driver '{}' → {} ({}) {}{} [{} {}] [exec #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            action,
            params_str,
            input_str,
            if shifted { " +shift" } else { "" },
            ctx.surface,
            ctx.control,
            exec_num
        );

        debug!(
            driver = self.name,
            action = action,
            params = ?params,
            exec_count = exec_num,
            "ConsoleDriver execution"
        );

        let key = Self::key(action, params);
        let mut state = self.state.lock();
        match (action, ctx.input) {
            ("toggle", CommandInput::Button { event: ButtonEvent::Down, .. }) => {
                let lit = state.get(&key).copied().unwrap_or(0) > 0;
                state.insert(key, if lit { 0 } else { 127 });
            }
            ("momentary", CommandInput::Button { event, .. }) => {
                state.insert(key, if event == ButtonEvent::Up { 0 } else { 127 });
            }
            (_, CommandInput::Value(value)) => {
                state.insert(key, value as i32);
            }
            _ => {}
        }

        Ok(())
    }

    fn feedback(&self, action: &str, params: &[Value]) -> Option<i32> {
        self.state.lock().get(&Self::key(action, params)).copied()
    }

    fn sync(&self) -> Result<()> {
        if *self.initialized.read() {
            info!("🔄 ConsoleDriver '{}' syncing state", self.name);
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let was_initialized = *self.initialized.read();

        if was_initialized {
            info!(
                "🛑 ConsoleDriver '{}' shutting down (executed {} actions)",
                self.name,
                self.execution_count()
            );
        }

        *self.initialized.write() = false;
        Ok(())
    }
}

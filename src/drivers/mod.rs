//! Application drivers - executors of `Command::Action`
//!
//! Business logic ("toggle mute", "launch clip") lives behind this trait.
//! The surface only decides when an action runs and asks the driver what
//! the bound light should show.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::command::CommandContext;
use crate::error::SurfaceError;

pub mod console;

pub use console::ConsoleDriver;

/// Driver trait - all application integrations implement this
///
/// Methods take `&self` so drivers can be shared across surfaces; drivers
/// keep mutable state behind interior mutability.
pub trait Driver: Send + Sync {
    /// Name commands refer to (e.g. "console")
    fn name(&self) -> &str;

    /// Connect to the application
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Execute an action for the input in `ctx`
    ///
    /// # Arguments
    /// * `action` - The action name (e.g. "toggle", "transport")
    /// * `params` - Parameters from the binding
    /// * `ctx` - Input plus the surface state the action may change
    fn execute(&self, action: &str, params: &[Value], ctx: &mut CommandContext<'_>) -> Result<()>;

    /// Light value for a control bound to this action, if the driver knows it
    fn feedback(&self, _action: &str, _params: &[Value]) -> Option<i32> {
        None
    }

    /// Re-sync state after a configuration reload
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Drivers by name
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        if self.drivers.insert(name.clone(), driver).is_some() {
            warn!("Replacing registered driver '{}'", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }

    /// Run an action; failures are logged and never reach the caller
    pub fn execute(&self, name: &str, action: &str, params: &[Value], ctx: &mut CommandContext<'_>) {
        let Some(driver) = self.drivers.get(name) else {
            error!("{}", SurfaceError::UnknownDriver(name.to_string()));
            return;
        };
        if let Err(e) = driver.execute(action, params, ctx) {
            warn!("Driver '{}' failed to execute '{}': {:#}", name, action, e);
        }
    }

    pub fn feedback(&self, name: &str, action: &str, params: &[Value]) -> Option<i32> {
        self.drivers.get(name)?.feedback(action, params)
    }

    /// Initialize every driver; a driver that fails stays registered
    pub fn init_all(&self) {
        for (name, driver) in &self.drivers {
            match driver.init() {
                Ok(()) => info!("✅ Driver '{}' initialized", name),
                Err(e) => warn!("Driver '{}' failed to initialize: {:#}", name, e),
            }
        }
    }

    pub fn sync_all(&self) {
        for (name, driver) in &self.drivers {
            if let Err(e) = driver.sync() {
                warn!("Driver '{}' failed to sync: {:#}", name, e);
            }
        }
    }

    pub fn shutdown_all(&self) {
        for (name, driver) in &self.drivers {
            if let Err(e) = driver.shutdown() {
                warn!("Driver '{}' failed to shut down: {:#}", name, e);
            }
        }
    }
}

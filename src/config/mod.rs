//! Configuration management for the control surface
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::fs;

use crate::command::Command;
use crate::control_mapping::{load_default_layout, ControlLayout};
use crate::modes::{ModeId, ViewId};
use crate::surface::button::DEFAULT_LONG_PRESS_MS;
use crate::surface::grid::GridLayout;
use crate::surface::ids::ControlId;
use crate::surface::keep_alive::{KeepAlive, DEFAULT_KEEP_ALIVE_MS};
use crate::surface::DEFAULT_FLUSH_DELAY_MS;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extenders: Vec<ExtenderConfig>,
    /// Control id (`play`, `fader3`, `row2_5`...) to command
    #[serde(default)]
    pub bindings: BTreeMap<String, Command>,
    #[serde(default)]
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<ModeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_view: Option<ViewId>,
}

/// MIDI port configuration of the primary unit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    pub input_port: String,
    pub output_port: String,
}

/// Timing and hardware shape shared by every unit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Period of the background refresh
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Layout CSV; the embedded layout is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAliveConfig>,
    /// Channel strips per unit, used to offset extenders
    #[serde(default = "default_strips_per_unit")]
    pub strips_per_unit: u8,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            long_press_ms: default_long_press_ms(),
            flush_delay_ms: default_flush_delay_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            layout: None,
            grid: None,
            keep_alive: None,
            strips_per_unit: default_strips_per_unit(),
        }
    }
}

/// Pad grid; channel is 1-16
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_channel")]
    pub channel: u8,
    pub rows: u8,
    pub columns: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_note: Option<u8>,
    /// Explicit raw note per pad, bottom-left first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<u8>>,
}

/// Keep-alive ping; byte strings are hex (`"F0 00 20 29 F7"`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeepAliveConfig {
    #[serde(default = "default_keep_alive_ms")]
    pub interval_ms: u64,
    pub ping: String,
    #[serde(default)]
    pub ack_prefix: String,
}

/// Extra unit extending the primary's track range
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtenderConfig {
    pub name: String,
    pub input_port: String,
    pub output_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

/// Console mode with fixed light values
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModeConfig {
    pub id: ModeId,
    #[serde(default)]
    pub lights: BTreeMap<String, i32>,
}

/// Console view
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    pub id: ViewId,
    /// Overview views never become a track's preferred view
    #[serde(default)]
    pub overview: bool,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate YAML content
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.is_empty() {
            bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.is_empty() {
            bail!("MIDI output_port cannot be empty");
        }

        let surface = &self.surface;
        if surface.long_press_ms == 0 {
            bail!("surface.long_press_ms must be positive");
        }
        if surface.flush_interval_ms == 0 {
            bail!("surface.flush_interval_ms must be positive");
        }
        if surface.strips_per_unit == 0 {
            bail!("surface.strips_per_unit must be positive");
        }
        self.grid_layout()?;
        self.keep_alive()?;

        let mut names = HashSet::new();
        for extender in &self.extenders {
            if extender.name.is_empty() || extender.input_port.is_empty() || extender.output_port.is_empty() {
                bail!("Extenders need a name, an input_port and an output_port");
            }
            if !names.insert(extender.name.as_str()) {
                bail!("Extender '{}' is listed twice", extender.name);
            }
        }
        let units = self.extenders.len() + 1;
        if units * surface.strips_per_unit as usize > u8::MAX as usize {
            bail!("{} units of {} strips exceed the addressable track range", units, surface.strips_per_unit);
        }

        let modes = self.mode_ids()?;
        let views = self.view_ids()?;
        if let Some(mode) = &self.default_mode {
            if !modes.contains(mode) {
                bail!("default_mode '{}' is not defined", mode);
            }
        }
        if let Some(view) = &self.default_view {
            if !views.contains(view) {
                bail!("default_view '{}' is not defined", view);
            }
        }

        for mode in &self.modes {
            for control in mode.lights.keys() {
                control
                    .parse::<ControlId>()
                    .with_context(|| format!("Invalid light in mode '{}'", mode.id))?;
            }
        }

        for (control, command) in &self.bindings {
            control.parse::<ControlId>().context("Invalid binding")?;
            match command {
                Command::SelectMode { mode } | Command::MomentaryMode { mode } if !modes.contains(mode) => {
                    bail!("Binding '{}' refers to unknown mode '{}'", control, mode);
                }
                Command::SelectView { view } if !views.contains(view) => {
                    bail!("Binding '{}' refers to unknown view '{}'", control, view);
                }
                Command::Action { driver, action, .. } if driver.is_empty() || action.is_empty() => {
                    bail!("Binding '{}' needs a driver and an action", control);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Bindings keyed by parsed control id
    pub fn bindings(&self) -> Result<HashMap<ControlId, Command>> {
        self.bindings
            .iter()
            .map(|(control, command)| {
                let id = control
                    .parse::<ControlId>()
                    .with_context(|| format!("Invalid binding '{}'", control))?;
                Ok((id, command.clone()))
            })
            .collect()
    }

    /// Light values of a configured mode keyed by control id
    pub fn mode_lights(mode: &ModeConfig) -> Result<HashMap<ControlId, i32>> {
        mode.lights
            .iter()
            .map(|(control, value)| Ok((control.parse::<ControlId>()?, *value)))
            .collect()
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.surface.long_press_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.surface.flush_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.surface.flush_interval_ms)
    }

    /// Grid layout, if a grid is configured
    pub fn grid_layout(&self) -> Result<Option<GridLayout>> {
        let Some(grid) = &self.surface.grid else {
            return Ok(None);
        };
        if grid.channel == 0 || grid.channel > 16 {
            bail!("Grid has invalid MIDI channel {} (must be 1-16)", grid.channel);
        }
        let channel = grid.channel - 1;
        let layout = match (&grid.notes, grid.start_note) {
            (Some(notes), None) => GridLayout::from_notes(channel, grid.rows, grid.columns, notes)?,
            (None, Some(start)) => GridLayout::sequential(channel, grid.rows, grid.columns, start)?,
            _ => bail!("Grid needs exactly one of 'start_note' or 'notes'"),
        };
        Ok(Some(layout))
    }

    /// Fresh keep-alive state, if one is configured
    pub fn keep_alive(&self) -> Result<Option<KeepAlive>> {
        let Some(keep_alive) = &self.surface.keep_alive else {
            return Ok(None);
        };
        if keep_alive.interval_ms == 0 {
            bail!("keep_alive.interval_ms must be positive");
        }
        let ping = parse_hex_bytes(&keep_alive.ping).context("Invalid keep_alive.ping")?;
        if ping.is_empty() {
            bail!("keep_alive.ping cannot be empty");
        }
        let ack_prefix = parse_hex_bytes(&keep_alive.ack_prefix).context("Invalid keep_alive.ack_prefix")?;
        Ok(Some(KeepAlive::new(
            ping,
            ack_prefix,
            Duration::from_millis(keep_alive.interval_ms),
        )))
    }

    /// Load a layout file, or the embedded layout when `path` is `None`
    pub async fn load_layout(path: Option<&str>) -> Result<ControlLayout> {
        match path {
            Some(path) => ControlLayout::load_from_csv(path).await,
            None => load_default_layout(),
        }
    }

    fn mode_ids(&self) -> Result<HashSet<&ModeId>> {
        let mut ids = HashSet::new();
        for mode in &self.modes {
            if mode.id.as_str().is_empty() {
                bail!("Mode id cannot be empty");
            }
            if !ids.insert(&mode.id) {
                bail!("Mode '{}' is defined twice", mode.id);
            }
        }
        Ok(ids)
    }

    fn view_ids(&self) -> Result<HashSet<&ViewId>> {
        let mut ids = HashSet::new();
        for view in &self.views {
            if view.id.as_str().is_empty() {
                bail!("View id cannot be empty");
            }
            if !ids.insert(&view.id) {
                bail!("View '{}' is defined twice", view.id);
            }
        }
        Ok(ids)
    }
}

/// Parse whitespace separated hex bytes
fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .map(|byte| {
            let digits = byte.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16).with_context(|| format!("'{}' is not a hex byte", byte))
        })
        .collect()
}

// Default value functions
fn default_long_press_ms() -> u64 { DEFAULT_LONG_PRESS_MS }
fn default_flush_delay_ms() -> u64 { DEFAULT_FLUSH_DELAY_MS }
fn default_flush_interval_ms() -> u64 { 100 }
fn default_strips_per_unit() -> u8 { 8 }
fn default_channel() -> u8 { 1 }
fn default_keep_alive_ms() -> u64 { DEFAULT_KEEP_ALIVE_MS }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ids::ButtonId;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
midi:
  input_port: "X-Touch"
  output_port: "X-Touch"
"#;

    const FULL: &str = r#"
midi:
  input_port: "MCU"
  output_port: "MCU"
surface:
  long_press_ms: 500
  grid:
    channel: 2
    rows: 2
    columns: 4
    start_note: 36
  keep_alive:
    interval_ms: 2000
    ping: "F0 00 20 29 02 F7"
    ack_prefix: "F0 00 20"
extenders:
  - name: ext1
    input_port: "MCU XT"
    output_port: "MCU XT"
bindings:
  play:
    type: action
    driver: console
    action: toggle
    params: ["transport"]
  f1:
    type: select_mode
    mode: pan
  f2:
    type: momentary_mode
    mode: sends
  track1:
    type: select_track
    position: 0
modes:
  - id: pan
    lights:
      f1: 127
  - id: sends
views:
  - id: clips
  - id: overview
    overview: true
default_mode: pan
default_view: clips
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.surface.long_press_ms, 400);
        assert_eq!(config.surface.flush_delay_ms, 5);
        assert_eq!(config.surface.flush_interval_ms, 100);
        assert_eq!(config.surface.strips_per_unit, 8);
        assert!(config.grid_layout().unwrap().is_none());
        assert!(config.keep_alive().unwrap().is_none());
        assert!(config.bindings().unwrap().is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(config.long_press(), Duration::from_millis(500));
        assert_eq!(config.extenders.len(), 1);

        let grid = config.grid_layout().unwrap().unwrap();
        assert_eq!(grid.channel(), 1);
        assert_eq!(grid.len(), 8);
        assert_eq!(grid.raw_note(0), Some(36));

        let keep_alive = config.keep_alive().unwrap().unwrap();
        assert_eq!(keep_alive.pings_sent(), 0);

        let bindings = config.bindings().unwrap();
        assert_eq!(
            bindings.get(&ControlId::Button(ButtonId::Play)),
            Some(&Command::Action {
                driver: "console".into(),
                action: "toggle".into(),
                params: vec![serde_json::json!("transport")],
            })
        );
        assert_eq!(
            bindings.get(&ControlId::Button(ButtonId::Function(1))),
            Some(&Command::MomentaryMode { mode: ModeId::from("sends") })
        );

        let lights = AppConfig::mode_lights(&config.modes[0]).unwrap();
        assert_eq!(lights.get(&ControlId::Button(ButtonId::Function(0))), Some(&127));
    }

    #[test]
    fn test_rejects_unknown_references() {
        let unknown_mode = format!("{}\nbindings:\n  f1:\n    type: select_mode\n    mode: nope\n", MINIMAL);
        let err = AppConfig::parse(&unknown_mode).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown mode 'nope'"));

        let unknown_control = format!(
            "{}\nbindings:\n  flux_capacitor:\n    type: restore_mode\n",
            MINIMAL
        );
        assert!(AppConfig::parse(&unknown_control).is_err());

        let default_view = format!("{}\ndefault_view: clips\n", MINIMAL);
        assert!(AppConfig::parse(&default_view).is_err());
    }

    #[test]
    fn test_rejects_bad_grid_and_keep_alive() {
        let both = format!(
            "{}\nsurface:\n  grid:\n    rows: 1\n    columns: 2\n    start_note: 0\n    notes: [0, 1]\n",
            MINIMAL
        );
        assert!(AppConfig::parse(&both).is_err());

        let channel = format!(
            "{}\nsurface:\n  grid:\n    channel: 17\n    rows: 1\n    columns: 2\n    start_note: 0\n",
            MINIMAL
        );
        assert!(AppConfig::parse(&channel).is_err());

        let ping = format!("{}\nsurface:\n  keep_alive:\n    ping: \"F0 ZZ F7\"\n", MINIMAL);
        assert!(AppConfig::parse(&ping).is_err());
    }

    #[test]
    fn test_rejects_empty_ports() {
        let config = "midi:\n  input_port: \"\"\n  output_port: \"out\"\n";
        assert!(AppConfig::parse(config).is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("F0 0x7f 00").unwrap(), vec![0xF0, 0x7F, 0x00]);
        assert!(parse_hex_bytes("").unwrap().is_empty());
        assert!(parse_hex_bytes("100").is_err());
    }

    #[tokio::test]
    async fn test_load_and_save_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();
        std::fs::write(&path, FULL)?;

        let config = AppConfig::load(&path).await?;
        config.save(&path).await?;
        let reloaded = AppConfig::load(&path).await?;

        assert_eq!(reloaded.bindings()?, config.bindings()?);
        assert_eq!(reloaded.default_mode, Some(ModeId::from("pan")));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        assert!(AppConfig::load("/nonexistent/config.yaml").await.is_err());
    }

    #[tokio::test]
    async fn test_load_layout_falls_back_to_embedded() -> Result<()> {
        let layout = AppConfig::load_layout(None).await?;
        assert!(layout.get(&ControlId::Button(ButtonId::Play)).is_some());
        Ok(())
    }
}

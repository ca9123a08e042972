//! Build the surface group described by a configuration

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use super::commands::SurfaceCommand;
use super::scheduler::TokioScheduler;
use crate::config::AppConfig;
use crate::device::MidiSink;
use crate::drivers::DriverRegistry;
use crate::modes::{ConsoleMode, ConsoleView};
use crate::surface::{ControlSurface, SurfaceGroup, SurfaceSetup};

/// Name of the primary unit
pub const PRIMARY_NAME: &str = "main";

/// One physical unit and where it sits in the combined track range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConfig {
    pub name: String,
    pub input_port: String,
    pub output_port: String,
    pub layout: Option<String>,
    pub extender_offset: u8,
}

/// Primary unit first, then the extenders in configuration order
pub fn units(config: &AppConfig) -> Vec<UnitConfig> {
    let strips = config.surface.strips_per_unit;
    let primary = UnitConfig {
        name: PRIMARY_NAME.to_string(),
        input_port: config.midi.input_port.clone(),
        output_port: config.midi.output_port.clone(),
        layout: config.surface.layout.clone(),
        extender_offset: 0,
    };
    let extenders = config.extenders.iter().enumerate().map(|(i, extender)| UnitConfig {
        name: extender.name.clone(),
        input_port: extender.input_port.clone(),
        output_port: extender.output_port.clone(),
        layout: extender.layout.clone().or_else(|| config.surface.layout.clone()),
        // validate() keeps units * strips within u8
        extender_offset: (i as u8 + 1).saturating_mul(strips),
    });
    std::iter::once(primary).chain(extenders).collect()
}

/// Build every unit; `connect` supplies the output sink of each
///
/// Only the primary unit gets the pad grid.
pub async fn build_group<F>(
    config: &AppConfig,
    drivers: DriverRegistry,
    tx: &mpsc::UnboundedSender<SurfaceCommand>,
    mut connect: F,
) -> Result<SurfaceGroup>
where
    F: FnMut(&UnitConfig) -> Result<Box<dyn MidiSink>>,
{
    let bindings = config.bindings()?;
    let mut group = SurfaceGroup::new(drivers);

    for (index, unit) in units(config).into_iter().enumerate() {
        let layout = AppConfig::load_layout(unit.layout.as_deref())
            .await
            .with_context(|| format!("Failed to load layout of '{}'", unit.name))?;

        let mut setup = SurfaceSetup::new(unit.name.clone(), layout);
        setup.extender_offset = unit.extender_offset;
        setup.grid = if index == 0 { config.grid_layout()? } else { None };
        setup.long_press = config.long_press();
        setup.flush_delay = config.flush_delay();
        setup.keep_alive = config.keep_alive()?;

        let sink = connect(&unit).with_context(|| format!("Failed to open output of '{}'", unit.name))?;
        let scheduler = Box::new(TokioScheduler::new(index, tx.clone()));
        let mut surface = ControlSurface::new(setup, scheduler, sink)
            .with_context(|| format!("Failed to build surface '{}'", unit.name))?;

        register_behaviors(&mut surface, config)?;
        surface.bind_commands(&bindings);
        group.add(surface);
    }

    info!("Built {} surface(s)", group.len());
    Ok(group)
}

/// Register the configured console modes and views and select the defaults
pub fn register_behaviors(surface: &mut ControlSurface, config: &AppConfig) -> Result<()> {
    for mode in &config.modes {
        let lights = AppConfig::mode_lights(mode)?;
        surface
            .modes_mut()
            .register(mode.id.clone(), Box::new(ConsoleMode::new(mode.id.as_str(), lights)));
    }
    for view in &config.views {
        let views = surface.views_mut();
        views.register(view.id.clone(), Box::new(ConsoleView::new(view.id.as_str())));
        if view.overview {
            views.set_overview(view.id.clone());
        }
    }

    if let Some(mode) = &config.default_mode {
        surface.modes_mut().set_active(mode);
    }
    if let Some(view) = &config.default_view {
        surface.views_mut().set_active(view);
    }
    // Every unit starts in the same mode; nothing to mirror
    surface.take_mode_changes();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemorySink;
    use crate::modes::ModeId;

    const CONFIG: &str = r#"
midi:
  input_port: "MCU"
  output_port: "MCU"
surface:
  strips_per_unit: 8
  grid:
    rows: 1
    columns: 4
    start_note: 100
extenders:
  - name: ext1
    input_port: "XT1"
    output_port: "XT1"
  - name: ext2
    input_port: "XT2"
    output_port: "XT2"
modes:
  - id: pan
  - id: sends
default_mode: sends
"#;

    #[test]
    fn test_units_are_offset_by_strips() {
        let config = AppConfig::parse(CONFIG).unwrap();
        let units = units(&config);
        let offsets: Vec<u8> = units.iter().map(|u| u.extender_offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(units[0].name, PRIMARY_NAME);
        assert_eq!(units[2].input_port, "XT2");
    }

    #[tokio::test]
    async fn test_build_group_registers_behaviors() -> Result<()> {
        let config = AppConfig::parse(CONFIG)?;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ports = Vec::new();

        let mut group = build_group(&config, DriverRegistry::new(), &tx, |unit| {
            ports.push(unit.output_port.clone());
            Ok(Box::new(MemorySink::new()) as Box<dyn MidiSink>)
        })
        .await?;

        assert_eq!(ports, vec!["MCU", "XT1", "XT2"]);
        assert_eq!(group.len(), 3);
        assert!(group.surface(0).and_then(|s| s.grid()).is_some());
        assert!(group.surface(1).and_then(|s| s.grid()).is_none());
        for surface in group.surfaces() {
            assert_eq!(surface.modes().active(), Some(&ModeId::from("sends")));
        }
        assert!(group.surface_mut(2).map(|s| s.take_mode_changes().is_empty()).unwrap_or(false));
        assert_eq!(group.find("ext2"), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_connection_names_the_unit() {
        let config = AppConfig::parse(CONFIG).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = build_group(&config, DriverRegistry::new(), &tx, |unit| {
            if unit.name == "ext1" {
                anyhow::bail!("port busy");
            }
            Ok(Box::new(MemorySink::new()) as Box<dyn MidiSink>)
        })
        .await
        .err()
        .map(|e| format!("{:#}", e))
        .unwrap_or_default();

        assert!(err.contains("ext1"));
        assert!(err.contains("port busy"));
    }
}

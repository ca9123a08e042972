//! Hot-reload of the configuration file

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Time given to editors to finish writing before the file is re-read
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Watches the config file and yields every configuration that validates
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, AppConfig)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        // notify calls back on its own OS thread
        let runtime = tokio::runtime::Handle::current();
        let path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                debug!("Config file changed: {:?}", event.paths);
                let path = path.clone();
                let tx = tx.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(SETTLE_DELAY).await;
                    match AppConfig::load(&path).await {
                        Ok(config) => {
                            info!("🔄 Configuration reloaded");
                            if let Err(e) = tx.send(config).await {
                                error!("Failed to send config update: {}", e);
                            }
                        }
                        Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
                    }
                });
            }
            Ok(_) => {}
            Err(e) => error!("Watch error: {}", e),
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        info!("Watching {} for changes", config_path);

        Ok((Self { _watcher: watcher, rx }, initial_config))
    }

    /// Next valid configuration; `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeId;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reload_delivers_new_bindings() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");

        fs::write(
            &config_path,
            "midi:\n  input_port: \"in\"\n  output_port: \"out\"\n",
        )?;

        let (mut watcher, config) = ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.midi.input_port, "in");
        assert!(config.bindings.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            r#"
midi:
  input_port: "in"
  output_port: "out"
modes:
  - id: pan
bindings:
  f1:
    type: select_mode
    mode: pan
"#,
        )?;

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;
        if let Some(reloaded) = reloaded {
            assert_eq!(reloaded.modes[0].id, ModeId::from("pan"));
            assert_eq!(reloaded.bindings.len(), 1);
        }

        Ok(())
    }
}

//! Control surface daemon
//!
//! Drives one primary unit plus any extenders from a YAML configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use control_surface::config::{AppConfig, ConfigWatcher};
use control_surface::device::{InputPort, MemorySink, MidiSink, OutputPort};
use control_surface::drivers::{ConsoleDriver, DriverRegistry};
use control_surface::runtime::{build_group, units, SurfaceActor, SurfaceHandle};
use control_surface::sniffer;

/// Control surface engine - buttons, pads, modes and feedback for MIDI controllers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run in sniffer mode
    #[arg(long)]
    sniffer: bool,

    /// Port to sniff (all physical inputs when omitted)
    #[arg(long, requires = "sniffer")]
    sniff_port: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Print the control layout and exit
    #[arg(long)]
    show_layout: bool,

    /// Run without hardware; output goes to memory
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        sniffer::list_ports_formatted();
        return Ok(());
    }

    if args.sniffer {
        return sniffer::run_cli_sniffer(args.sniff_port.as_deref()).await;
    }

    if args.show_layout {
        let layout = match AppConfig::load(&args.config).await {
            Ok(config) => AppConfig::load_layout(config.surface.layout.as_deref()).await?,
            Err(e) => {
                warn!("Using the embedded layout: {:#}", e);
                AppConfig::load_layout(None).await?
            }
        };
        sniffer::print_layout(&layout);
        return Ok(());
    }

    info!("Starting control surface...");
    info!("Configuration file: {}", args.config);

    let (config_watcher, config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    run_app(config, config_watcher, args.dry_run, shutdown_signal()).await?;

    info!("Control surface shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut config_watcher: ConfigWatcher,
    dry_run: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(ConsoleDriver::new("console")));

    let (tx, rx) = mpsc::unbounded_channel();
    let group = build_group(&config, drivers, &tx, |unit| {
        if dry_run {
            info!("Dry run: '{}' writes to memory", unit.name);
            return Ok(Box::new(MemorySink::new()) as Box<dyn MidiSink>);
        }
        Ok(Box::new(OutputPort::connect(&unit.output_port)?) as Box<dyn MidiSink>)
    })
    .await?;

    let (handle, actor) = SurfaceActor::spawn(group, tx, rx, config.flush_interval());

    // Dropping these closes the hardware inputs
    let _inputs = if dry_run {
        Vec::new()
    } else {
        connect_inputs(&config, &handle)?
    };

    info!("✅ Ready to process MIDI events!");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                handle.reload(new_config);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    handle.shutdown();
    actor.await.context("Surface actor failed")?;
    Ok(())
}

/// Route every unit's hardware input into the actor
fn connect_inputs(config: &AppConfig, handle: &SurfaceHandle) -> Result<Vec<InputPort>> {
    units(config)
        .into_iter()
        .enumerate()
        .map(|(index, unit)| {
            let handle = handle.clone();
            InputPort::connect(&unit.input_port, move |data| handle.midi_in(index, data.to_vec()))
                .with_context(|| format!("Failed to open input of '{}'", unit.name))
        })
        .collect()
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

//! MIDI sniffer and console listings for debugging and development

use anyhow::{bail, Result};
use colored::*;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::control_mapping::ControlLayout;
use crate::device::{discovery, InputPort};
use crate::midi::{format_hex, MidiMessage};

/// Message seen on one port
#[derive(Debug, Clone)]
pub struct SnifferEvent {
    pub timestamp_ms: u64,
    pub port_name: String,
    pub data: Vec<u8>,
}

/// Monitor `pattern` (or every physical input) until Ctrl+C
pub async fn run_cli_sniffer(pattern: Option<&str>) -> Result<()> {
    println!("{}", "=== MIDI Sniffer ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let (event_tx, mut event_rx) = mpsc::channel::<SnifferEvent>(1000);
    let start_time = Instant::now();

    let patterns: Vec<String> = match pattern {
        Some(pattern) => vec![pattern.to_string()],
        None => discovery::discover_input_ports()?
            .into_iter()
            .filter(|port| !port.is_virtual)
            .map(|port| port.name)
            .collect(),
    };

    let mut connections = Vec::new();
    for pattern in &patterns {
        let event_tx = event_tx.clone();
        let port_name = pattern.clone();
        let connected = InputPort::connect(pattern, move |data| {
            let event = SnifferEvent {
                timestamp_ms: start_time.elapsed().as_millis() as u64,
                port_name: port_name.clone(),
                data: data.to_vec(),
            };
            let _ = event_tx.try_send(event);
        });
        match connected {
            Ok(port) => connections.push(port),
            Err(e) => warn!("Skipping '{}': {:#}", pattern, e),
        }
    }
    drop(event_tx);

    if connections.is_empty() {
        bail!("No MIDI input to monitor");
    }
    for port in &connections {
        info!("Monitoring {}", port.name());
    }

    println!("\n{}", "Monitoring MIDI traffic...".green());
    println!("{}", "Format: [timestamp] PORT | HEX => PARSED".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\n{}", "Sniffer stopped".yellow());
    Ok(())
}

fn print_event(event: &SnifferEvent) {
    let port = if event.port_name.chars().count() > 20 {
        format!("{}...", event.port_name.chars().take(17).collect::<String>())
    } else {
        event.port_name.clone()
    };

    let hex = format_hex(&event.data);
    let message = MidiMessage::parse(&event.data);
    let parsed = message
        .as_ref()
        .map(|msg| format!(" => {}", msg.to_string().bright_blue()))
        .unwrap_or_default();

    let hex_colored = match message {
        Some(MidiMessage::NoteOn { .. }) => hex.bright_green(),
        Some(MidiMessage::NoteOff { .. }) => hex.bright_red(),
        Some(MidiMessage::ControlChange { .. }) => hex.bright_yellow(),
        Some(MidiMessage::PitchBend { .. }) => hex.bright_cyan(),
        Some(MidiMessage::SysEx { .. }) => hex.bright_magenta(),
        Some(_) => hex.normal(),
        None => hex.bright_black(),
    };

    println!(
        "[{}ms] {:20} | {}{}",
        format!("{:08}", event.timestamp_ms).dimmed(),
        port.white(),
        hex_colored,
        parsed
    );
}

/// List all ports in a formatted way
pub fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let sections = [
        ("Input Ports:", discovery::discover_input_ports()),
        ("Output Ports:", discovery::discover_output_ports()),
    ];
    for (title, ports) in sections {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for port in ports {
                    let marker = if port.is_virtual {
                        "[VIRTUAL]".yellow()
                    } else {
                        "[PHYSICAL]".green()
                    };
                    println!("  {:>2}. {} {}", port.index, marker, port.name);
                }
            }
            Err(e) => println!("  {} {:#}", "Discovery failed:".red(), e),
        }
    }
    println!();
}

/// Print a control layout grouped the way its CSV groups it
pub fn print_layout(layout: &ControlLayout) {
    println!("\n{}", "=== Control Layout ===".bold().cyan());
    println!("  Total controls: {}", layout.len().to_string().green());

    let mut groups: Vec<&str> = Vec::new();
    for entry in layout.entries() {
        if !groups.contains(&entry.group.as_str()) {
            groups.push(&entry.group);
        }
    }
    for group in groups {
        println!("\n{}", group.yellow().bold());
        for entry in layout.entries().iter().filter(|e| e.group == group) {
            let feedback = entry
                .feedback
                .map(|address| address.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:16} {:24} {}",
                entry.control.to_string().white(),
                entry.input.to_string(),
                feedback.dimmed()
            );
        }
    }
    println!();
}

//! Hardware MIDI ports
//!
//! Connects to controller ports by name and provides the sinks the output
//! cache writes through.

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection, MidiOutputPort};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::midi::format_hex;

/// Destination for raw MIDI bytes
///
/// Writes are fire-and-forget: callers log failures and move on.
pub trait MidiSink: Send {
    fn send(&mut self, data: &[u8]) -> Result<()>;
}

/// Sink that keeps every message in memory
///
/// Used for dry runs without hardware. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every message sent so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Make subsequent sends fail, simulating an unplugged device
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl MidiSink for MemorySink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(anyhow!("memory sink is offline"));
        }
        debug!("Dry-run out: {}", format_hex(data));
        self.sent.lock().push(data.to_vec());
        Ok(())
    }
}

/// Connected hardware output port
pub struct OutputPort {
    name: String,
    conn: MidiOutputConnection,
}

impl OutputPort {
    /// Connect to the first output port whose name contains `pattern`
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new("ControlSurface-Output")
            .context("Failed to create MIDI output")?;

        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, name) = find_output_port(&midi_out, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", name);

        let conn = midi_out
            .connect(&port, "ControlSurface")
            .map_err(|e| anyhow!("Failed to connect to output port '{}': {}", name, e))?;

        Ok(Self { name, conn })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MidiSink for OutputPort {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.conn
            .send(data)
            .with_context(|| format!("Failed to send MIDI to '{}'", self.name))?;
        debug!("Sent: {}", format_hex(data));
        Ok(())
    }
}

/// Connected hardware input port; dropping it closes the connection
pub struct InputPort {
    name: String,
    _conn: MidiInputConnection<()>,
}

impl InputPort {
    /// Connect to the first input port whose name contains `pattern`
    ///
    /// `on_message` runs on the MIDI backend's thread and must hand the
    /// bytes off without blocking.
    pub fn connect<F>(pattern: &str, mut on_message: F) -> Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let midi_in = MidiInput::new("ControlSurface-Input")
            .context("Failed to create MIDI input")?;

        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (port, name) = find_input_port(&midi_in, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;

        info!("Connecting to input port: {}", name);

        let conn = midi_in
            .connect(
                &port,
                "ControlSurface",
                move |_timestamp, data, _| on_message(data),
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port '{}': {}", name, e))?;

        Ok(Self { name, _conn: conn })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Find an input port by case-insensitive substring match
fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
    let pattern = pattern.to_lowercase();
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Find an output port by case-insensitive substring match
fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    midi_out.ports().into_iter().find_map(|port| {
        let name = midi_out.port_name(&port).ok()?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Port discovery utilities
pub mod discovery {
    use super::*;

    /// Information about a MIDI port
    #[derive(Debug, Clone)]
    pub struct PortInfo {
        pub index: usize,
        pub name: String,
        pub is_virtual: bool,
    }

    fn is_virtual(name: &str) -> bool {
        name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
    }

    /// Discover input ports
    pub fn discover_input_ports() -> Result<Vec<PortInfo>> {
        let midi_in = MidiInput::new("ControlSurface-Discovery")?;

        Ok(midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                let name = midi_in.port_name(port).ok()?;
                Some(PortInfo { index, is_virtual: is_virtual(&name), name })
            })
            .collect())
    }

    /// Discover output ports
    pub fn discover_output_ports() -> Result<Vec<PortInfo>> {
        let midi_out = MidiOutput::new("ControlSurface-Discovery")?;

        Ok(midi_out
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                let name = midi_out.port_name(port).ok()?;
                Some(PortInfo { index, is_virtual: is_virtual(&name), name })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.send(&[0x90, 1, 2]).unwrap();
        assert_eq!(sink.sent(), vec![vec![0x90, 1, 2]]);

        sink.set_failing(true);
        assert!(writer.send(&[0x90, 1, 0]).is_err());
        assert_eq!(sink.len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_port_discovery() {
        // Only checks that discovery never panics without hardware
        let _ = discovery::discover_input_ports();
        let _ = discovery::discover_output_ports();
    }
}

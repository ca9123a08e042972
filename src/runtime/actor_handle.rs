//! SurfaceHandle - public API of the SurfaceActor
//!
//! Fire-and-forget methods for the hot path, async methods with oneshot
//! channels for queries. Cloning is cheap; every MIDI input callback holds
//! its own clone.

use tokio::sync::{mpsc, oneshot};

use super::commands::{SurfaceCommand, SurfaceStatus};
use crate::config::AppConfig;
use crate::surface::ids::ButtonId;
use crate::surface::output::OutputAddress;

#[derive(Debug, Clone)]
pub struct SurfaceHandle {
    cmd_tx: mpsc::UnboundedSender<SurfaceCommand>,
}

impl SurfaceHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<SurfaceCommand>) -> Self {
        Self { cmd_tx }
    }

    // =========================================================================
    // Hot path (fire-and-forget)
    // =========================================================================

    /// Raw bytes from the unit at `surface`
    pub fn midi_in(&self, surface: usize, data: Vec<u8>) {
        let _ = self.cmd_tx.send(SurfaceCommand::MidiIn { surface, data });
    }

    pub fn flush(&self) {
        let _ = self.cmd_tx.send(SurfaceCommand::Flush);
    }

    pub fn trigger(&self, surface: usize, button: ButtonId) {
        let _ = self.cmd_tx.send(SurfaceCommand::Trigger { surface, button });
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn reload(&self, config: AppConfig) {
        let _ = self.cmd_tx.send(SurfaceCommand::Reload(Box::new(config)));
    }

    pub fn resync(&self) {
        let _ = self.cmd_tx.send(SurfaceCommand::Resync);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SurfaceCommand::Shutdown);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Mode, view and flush counters of one surface
    pub async fn describe(&self, surface: usize) -> Option<SurfaceStatus> {
        let (response, rx) = oneshot::channel();
        if self.cmd_tx.send(SurfaceCommand::Describe { surface, response }).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Last value written to `address` on one surface
    pub async fn cached_output(&self, surface: usize, address: OutputAddress) -> Option<i32> {
        let (response, rx) = oneshot::channel();
        let cmd = SurfaceCommand::CachedOutput {
            surface,
            address,
            response,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }
}

//! Messages understood by the surface actor
//!
//! Hot-path messages (MIDI in, fired timers) carry no response channel;
//! queries answer through a `oneshot`.

use tokio::sync::oneshot;

use crate::config::AppConfig;
use crate::modes::{ModeId, ViewId};
use crate::surface::ids::ButtonId;
use crate::surface::output::OutputAddress;
use crate::surface::scheduler::ScheduledTask;

/// Snapshot of one surface, answered to [`SurfaceCommand::Describe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceStatus {
    pub name: String,
    pub extender_offset: u8,
    pub active_mode: Option<ModeId>,
    pub temporary_mode: Option<ModeId>,
    pub active_view: Option<ViewId>,
    /// Combined track index across all units
    pub selected_track: Option<usize>,
    pub flushes: u64,
    pub flush_failures: u64,
    pub timer_failures: u64,
}

pub enum SurfaceCommand {
    // -------------------------------------------------------------------------
    // Hot path
    // -------------------------------------------------------------------------
    /// Raw bytes received from the unit at index `surface`
    MidiIn { surface: usize, data: Vec<u8> },

    /// A timer set by the surface at index `surface` fired
    Task { surface: usize, task: ScheduledTask },

    /// Request a flush of every unit
    Flush,

    /// Fire a button programmatically (DOWN then UP)
    Trigger { surface: usize, button: ButtonId },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Apply a reloaded configuration
    Reload(Box<AppConfig>),

    /// Push the complete state to every unit again
    Resync,

    Shutdown,

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------
    Describe {
        surface: usize,
        response: oneshot::Sender<Option<SurfaceStatus>>,
    },

    /// Last value written to an output, if any
    CachedOutput {
        surface: usize,
        address: OutputAddress,
        response: oneshot::Sender<Option<i32>>,
    },
}

impl std::fmt::Debug for SurfaceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MidiIn { surface, data } => f
                .debug_struct("MidiIn")
                .field("surface", surface)
                .field("data", &crate::midi::format_hex(data))
                .finish(),
            Self::Task { surface, task } => f
                .debug_struct("Task")
                .field("surface", surface)
                .field("task", task)
                .finish(),
            Self::Flush => f.write_str("Flush"),
            Self::Trigger { surface, button } => f
                .debug_struct("Trigger")
                .field("surface", surface)
                .field("button", button)
                .finish(),
            Self::Reload(_) => f.write_str("Reload"),
            Self::Resync => f.write_str("Resync"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::Describe { surface, .. } => f.debug_struct("Describe").field("surface", surface).finish(),
            Self::CachedOutput { surface, address, .. } => f
                .debug_struct("CachedOutput")
                .field("surface", surface)
                .field("address", address)
                .finish(),
        }
    }
}

//! Timers backed by the tokio runtime

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use super::commands::SurfaceCommand;
use crate::surface::scheduler::{ScheduledTask, TaskScheduler};

/// Posts fired tasks back into the actor channel
///
/// Each task gets its own sleeping tokio task; cancellation is left to the
/// surface, which ignores tasks that are no longer current.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    surface: usize,
    tx: mpsc::UnboundedSender<SurfaceCommand>,
}

impl TokioScheduler {
    pub fn new(surface: usize, tx: mpsc::UnboundedSender<SurfaceCommand>) -> Self {
        Self { surface, tx }
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, task: ScheduledTask, delay: Duration) {
        let surface = self.surface;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(surface, ?task, "Timer fired");
            // Closed channel means the actor is gone
            let _ = tx.send(SurfaceCommand::Task { surface, task });
        });
    }
}

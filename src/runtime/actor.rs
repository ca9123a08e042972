//! SurfaceActor - owns the surface group and serializes all access to it
//!
//! Every input (MIDI from any unit, fired timers, reloads, queries) goes
//! through one channel and is handled to completion before the next, so
//! the surfaces never need locks and mode mirroring happens within the
//! same pass as the change that caused it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::actor_handle::SurfaceHandle;
use super::commands::{SurfaceCommand, SurfaceStatus};
use crate::config::AppConfig;
use crate::surface::SurfaceGroup;

pub struct SurfaceActor {
    group: SurfaceGroup,
    command_rx: mpsc::UnboundedReceiver<SurfaceCommand>,
    /// Period of the background refresh
    flush_interval: Duration,
    handled: u64,
}

impl SurfaceActor {
    /// Spawn the actor's run loop
    ///
    /// `cmd_tx`/`command_rx` must be the channel the group's schedulers post
    /// into.
    pub fn spawn(
        group: SurfaceGroup,
        cmd_tx: mpsc::UnboundedSender<SurfaceCommand>,
        command_rx: mpsc::UnboundedReceiver<SurfaceCommand>,
        flush_interval: Duration,
    ) -> (SurfaceHandle, JoinHandle<SurfaceGroup>) {
        let actor = SurfaceActor {
            group,
            command_rx,
            flush_interval,
            handled: 0,
        };
        let task = tokio::spawn(actor.run());
        info!("SurfaceActor spawned");
        (SurfaceHandle::new(cmd_tx), task)
    }

    /// Process commands until shutdown; hands the group back at the end
    async fn run(mut self) -> SurfaceGroup {
        debug!("SurfaceActor run loop started");
        self.group.drivers().init_all();
        self.group.start();

        let mut refresh = tokio::time::interval(self.flush_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("Command channel closed");
                        break;
                    };
                    trace!(?cmd, "Processing command");
                    if !self.handle(cmd) {
                        break;
                    }
                    self.handled += 1;
                }
                _ = refresh.tick() => {
                    self.group.request_flush();
                }
            }
        }

        self.group.drivers().shutdown_all();
        info!(handled = self.handled, "SurfaceActor run loop terminated");
        self.group
    }

    /// Returns false on shutdown
    fn handle(&mut self, cmd: SurfaceCommand) -> bool {
        match cmd {
            SurfaceCommand::MidiIn { surface, data } => self.group.handle_midi(surface, &data),
            SurfaceCommand::Task { surface, task } => self.group.handle_task(surface, task),
            SurfaceCommand::Flush => self.group.request_flush(),
            SurfaceCommand::Trigger { surface, button } => self.group.trigger(surface, button),
            SurfaceCommand::Reload(config) => self.reload(&config),
            SurfaceCommand::Resync => {
                info!("🔁 Resyncing all surfaces");
                self.group.start();
            }
            SurfaceCommand::Shutdown => {
                info!("SurfaceActor received shutdown command");
                return false;
            }
            SurfaceCommand::Describe { surface, response } => {
                let _ = response.send(self.describe(surface));
            }
            SurfaceCommand::CachedOutput { surface, address, response } => {
                let value = self.group.surface(surface).and_then(|s| s.cache().cached(&address));
                let _ = response.send(value);
            }
        }
        true
    }

    fn reload(&mut self, config: &AppConfig) {
        match config.bindings() {
            Ok(bindings) => {
                self.group.rebind(&bindings);
                info!("Applied {} bindings to {} surface(s)", bindings.len(), self.group.len());
            }
            Err(e) => warn!("Ignoring reloaded bindings: {:#}", e),
        }
    }

    fn describe(&self, index: usize) -> Option<SurfaceStatus> {
        let surface = self.group.surface(index)?;
        Some(SurfaceStatus {
            name: surface.name().to_string(),
            extender_offset: surface.extender_offset(),
            active_mode: surface.modes().active().cloned(),
            temporary_mode: surface.modes().temporary().cloned(),
            active_view: surface.views().active().cloned(),
            selected_track: surface.views().selected_track(),
            flushes: surface.flush_scheduler().executed(),
            flush_failures: surface.flush_scheduler().failures(),
            timer_failures: surface.timer_failures(),
        })
    }
}

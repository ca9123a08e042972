//! Keep-alive ping for devices that drop out of remote mode when idle

use std::time::Duration;

use tracing::{debug, info, warn};

use super::scheduler::{ScheduledTask, TaskScheduler};
use crate::device::MidiSink;
use crate::midi::format_hex;

/// Default time between pings
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 1000;

/// Self-rescheduling ping
///
/// Sends `ping` every interval until an incoming message starts with the
/// acknowledgement prefix. With an empty prefix it pings forever.
#[derive(Debug)]
pub struct KeepAlive {
    ping: Vec<u8>,
    ack_prefix: Vec<u8>,
    interval: Duration,
    acknowledged: bool,
    /// A tick is scheduled and has not fired yet
    pending: bool,
    pings_sent: u64,
}

impl KeepAlive {
    pub fn new(ping: Vec<u8>, ack_prefix: Vec<u8>, interval: Duration) -> Self {
        Self {
            ping,
            ack_prefix,
            interval,
            acknowledged: false,
            pending: false,
            pings_sent: 0,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    /// Start (or restart after a reconnect) pinging
    pub fn start(&mut self, sink: &mut dyn MidiSink, scheduler: &dyn TaskScheduler) {
        self.acknowledged = false;
        if !self.pending {
            self.ping(sink, scheduler);
        }
    }

    /// Scheduled tick fired
    pub fn tick(&mut self, sink: &mut dyn MidiSink, scheduler: &dyn TaskScheduler) {
        self.pending = false;
        if self.acknowledged {
            debug!("Keep-alive acknowledged, stopping");
            return;
        }
        self.ping(sink, scheduler);
    }

    /// Check an incoming message against the acknowledgement prefix
    pub fn acknowledge(&mut self, raw: &[u8]) -> bool {
        if self.ack_prefix.is_empty() || !raw.starts_with(&self.ack_prefix) {
            return false;
        }
        if !self.acknowledged {
            info!("🤝 Device acknowledged keep-alive: {}", format_hex(raw));
        }
        self.acknowledged = true;
        true
    }

    fn ping(&mut self, sink: &mut dyn MidiSink, scheduler: &dyn TaskScheduler) {
        match sink.send(&self.ping) {
            Ok(()) => self.pings_sent += 1,
            Err(e) => warn!("Keep-alive ping failed: {:#}", e),
        }
        self.pending = true;
        scheduler.schedule(ScheduledTask::KeepAlive, self.interval);
    }
}

//! Deferred work: timer contract and flush coalescing

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{error, trace};

use super::ids::ButtonId;

/// Work a surface asks its host to run later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledTask {
    /// Long-press check for the press identified by `epoch`
    LongPress { button: ButtonId, epoch: u64 },
    /// Long-press check for a grid pad, by translated pad index
    GridLongPress { pad: u8, epoch: u64 },
    /// Deferred flush; only the latest generation executes
    Flush { generation: u64 },
    /// Keep-alive tick
    KeepAlive,
}

/// Host timer contract
///
/// Implementations deliver `task` back to the owning surface after `delay`,
/// on the same logical thread that processes input. Scheduled tasks are never
/// cancelled; a task that no longer applies is ignored when it arrives.
pub trait TaskScheduler: Send {
    fn schedule(&self, task: ScheduledTask, delay: Duration);
}

/// Coalesces flush requests into a single deferred execution
#[derive(Debug)]
pub struct FlushScheduler {
    generation: u64,
    delay: Duration,
    executed: u64,
    failures: u64,
}

impl FlushScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            generation: 0,
            delay,
            executed: 0,
            failures: 0,
        }
    }

    /// Ask for a flush; supersedes every request still pending
    pub fn request(&mut self, scheduler: &dyn TaskScheduler) {
        self.generation += 1;
        trace!("Flush requested (generation {})", self.generation);
        scheduler.schedule(ScheduledTask::Flush { generation: self.generation }, self.delay);
    }

    /// Whether a fired flush is the most recent request
    pub fn is_due(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Number of flushes that ran (successfully or not)
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Number of flushes whose body failed or panicked
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Run a fired flush if it is still current
    ///
    /// Returns false for superseded generations. Failures in `body` are
    /// logged and counted, never propagated.
    pub fn run<F>(&mut self, generation: u64, label: &str, body: F) -> bool
    where
        F: FnOnce() -> Result<()>,
    {
        if !self.is_due(generation) {
            trace!("Skipping superseded flush {} (latest {})", generation, self.generation);
            return false;
        }
        let ok = isolate(label, body);
        self.record(ok);
        true
    }

    /// Account for a flush executed by the caller through [`isolate`]
    pub fn record(&mut self, ok: bool) {
        self.executed += 1;
        if !ok {
            self.failures += 1;
        }
    }
}

/// Run `body`, catching errors and panics so the caller's loop keeps going
///
/// Returns true when the body completed without error.
pub fn isolate<F>(label: &str, body: F) -> bool
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{} failed: {:#}", label, e);
            false
        }
        Err(payload) => {
            error!("{} panicked: {}", label, panic_message(payload.as_ref()));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[derive(Debug, Default)]
struct ManualQueue {
    now: Duration,
    seq: u64,
    pending: Vec<(Duration, u64, ScheduledTask)>,
}

/// Scheduler driven by an explicit virtual clock
///
/// Tasks fire only when the caller advances time. Clones share the queue,
/// so one clone can be handed to a surface while another drives it.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.queue.lock().now
    }

    /// Tasks not yet fired, in firing order
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut pending = self.queue.lock().pending.clone();
        pending.sort_by_key(|(due, seq, _)| (*due, *seq));
        pending.into_iter().map(|(_, _, task)| task).collect()
    }

    /// Advance the clock by `by`, handing every task that comes due to
    /// `fire` in order
    ///
    /// Tasks scheduled from inside `fire` are honored if they come due
    /// before the new time.
    pub fn advance<F>(&self, by: Duration, mut fire: F)
    where
        F: FnMut(ScheduledTask),
    {
        let target = self.now() + by;
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let position = queue
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, (due, _, _))| *due <= target)
                    .min_by_key(|(_, (due, seq, _))| (*due, *seq))
                    .map(|(i, _)| i);
                position.map(|i| {
                    let (due, _, task) = queue.pending.remove(i);
                    queue.now = due;
                    task
                })
            };
            match next {
                Some(task) => fire(task),
                None => break,
            }
        }
        self.queue.lock().now = target;
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, task: ScheduledTask, delay: Duration) {
        let mut queue = self.queue.lock();
        let due = queue.now + delay;
        queue.seq += 1;
        let seq = queue.seq;
        queue.pending.push((due, seq, task));
    }
}

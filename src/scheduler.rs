//! Interval timers for the cooperative main loop.
//!
//! Every duty of the device runs on its own interval against the
//! millisecond clock.  The scheduler only answers "what is due now";
//! [`DeviceRuntime`](crate::app::service::DeviceRuntime) decides the order
//! in which due work is executed.
//!
//! ```text
//!   now_ms ──▶ Scheduler::poll ──▶ DueTasks { measure, blink, update_check }
//!                                        │
//!                                        ▼
//!                               DeviceRuntime::tick
//! ```

use log::{debug, info};

use crate::config::TimingConfig;

/// Work items known to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    Measure,
    Blink,
    UpdateCheck,
}

/// A single schedule entry.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Log label.
    pub label: &'static str,
    pub task: TaskId,
    /// Earliest uptime of the first run.
    pub first_at_ms: u64,
    /// Minimum gap between runs; a run is due once strictly more than this
    /// has elapsed.
    pub interval_ms: u64,
    pub enabled: bool,
}

/// Tasks that came due in one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueTasks {
    pub measure: bool,
    pub blink: bool,
    pub update_check: bool,
}

impl DueTasks {
    fn mark(&mut self, task: TaskId) {
        match task {
            TaskId::Measure => self.measure = true,
            TaskId::Blink => self.blink = true,
            TaskId::UpdateCheck => self.update_check = true,
        }
    }
}

/// Maximum number of concurrent schedules (stack-allocated).
const MAX_SCHEDULES: usize = 4;

#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    last_run_ms: Option<u64>,
}

impl ScheduleEntry {
    fn is_due(&self, now_ms: u64) -> bool {
        match self.last_run_ms {
            None => now_ms >= self.schedule.first_at_ms,
            Some(last) => now_ms.saturating_sub(last) > self.schedule.interval_ms,
        }
    }
}

pub struct Scheduler {
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedules: [None, None, None, None],
        }
    }

    /// Standard device schedule: measure at boot and then every interval,
    /// blink continuously, and check for updates after a boot delay.
    pub fn from_timing(timing: &TimingConfig, auto_update: bool) -> Self {
        let mut sched = Self::new();
        sched.add(Schedule {
            label: "measure",
            task: TaskId::Measure,
            first_at_ms: 0,
            interval_ms: timing.measurement_interval_ms,
            enabled: true,
        });
        sched.add(Schedule {
            label: "blink",
            task: TaskId::Blink,
            first_at_ms: timing.blink_interval_ms,
            interval_ms: timing.blink_interval_ms,
            enabled: true,
        });
        sched.add(Schedule {
            label: "update-check",
            task: TaskId::UpdateCheck,
            first_at_ms: timing.update_first_check_ms,
            interval_ms: timing.update_interval_ms,
            enabled: auto_update,
        });
        sched
    }

    /// Add a schedule.  Returns the slot index, or `None` if full.
    pub fn add(&mut self, schedule: Schedule) -> Option<usize> {
        for (i, slot) in self.schedules.iter_mut().enumerate() {
            if slot.is_none() {
                info!("Scheduler: added '{}' at slot {}", schedule.label, i);
                *slot = Some(ScheduleEntry {
                    schedule,
                    last_run_ms: None,
                });
                return Some(i);
            }
        }
        None
    }

    /// Collect every task due at `now_ms` and mark it as run.
    pub fn poll(&mut self, now_ms: u64) -> DueTasks {
        let mut due = DueTasks::default();
        for entry in self.schedules.iter_mut().flatten() {
            if !entry.schedule.enabled || !entry.is_due(now_ms) {
                continue;
            }
            debug!("Scheduler: '{}' due at {} ms", entry.schedule.label, now_ms);
            entry.last_run_ms = Some(now_ms);
            due.mark(entry.schedule.task);
        }
        due
    }

    /// Uptime at which `task` last came due.
    pub fn last_run(&self, task: TaskId) -> Option<u64> {
        self.schedules
            .iter()
            .flatten()
            .find(|e| e.schedule.task == task)
            .and_then(|e| e.last_run_ms)
    }

    /// Number of enabled schedules.
    pub fn active_count(&self) -> usize {
        self.schedules
            .iter()
            .flatten()
            .filter(|e| e.schedule.enabled)
            .count()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

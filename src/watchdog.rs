//! Connectivity watchdog.
//!
//! When connectivity is required, a device whose telemetry writes have been
//! failing for longer than the staleness limit restarts itself.  Cycles
//! with nothing to send (invalid reading) neither fail nor succeed.
//! WiFi stacks occasionally wedge in a state where the link looks up but no
//! request ever completes; a restart is the only reliable way out.

use log::error;

use crate::app::ports::{RestartPort, RestartReason};

/// Tracks link state and the age of the last successful telemetry write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub is_online: bool,
    /// Boot counts as a successful write.
    pub last_successful_write_ms: u64,
    /// A point was owed since the last successful write and was not
    /// delivered (offline or rejected).
    pub delivery_failing: bool,
}

impl ConnectivityState {
    pub fn record_delivery(&mut self, now_ms: u64) {
        self.last_successful_write_ms = now_ms;
        self.delivery_failing = false;
    }

    pub fn record_failure(&mut self) {
        self.delivery_failing = true;
    }
}

pub struct ConnectivityWatchdog {
    stale_after_ms: u64,
    fired: bool,
}

impl ConnectivityWatchdog {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            stale_after_ms,
            fired: false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Restart through `restart` if delivery has been broken too long.
    /// Returns `true` if the restart was requested by this call.
    pub fn check(
        &mut self,
        now_ms: u64,
        required: bool,
        state: &ConnectivityState,
        restart: &mut impl RestartPort,
    ) -> bool {
        if self.fired || !required || !state.delivery_failing {
            return false;
        }
        let silent_for = now_ms.saturating_sub(state.last_successful_write_ms);
        if silent_for <= self.stale_after_ms {
            return false;
        }

        self.fired = true;
        error!(
            "Watchdog: no telemetry delivered for {} ms (online={}), restarting",
            silent_for, state.is_online
        );
        restart.restart(RestartReason::ConnectivityStuck);
        true
    }
}

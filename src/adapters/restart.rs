//! Restart adapter.
//!
//! On hardware this resets the chip through `esp_ota::restart()` and never
//! returns.  The simulation records each request instead.

use log::info;

use crate::app::ports::{RestartPort, RestartReason};

#[derive(Default)]
pub struct SystemRestart {
    #[cfg(not(target_os = "espidf"))]
    requested: Vec<RestartReason>,
}

impl SystemRestart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts requested so far (simulation).
    #[cfg(not(target_os = "espidf"))]
    pub fn requested(&self) -> &[RestartReason] {
        &self.requested
    }
}

impl RestartPort for SystemRestart {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self, reason: RestartReason) {
        info!("Restarting: {}", reason);
        esp_ota::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self, reason: RestartReason) {
        info!("Restart requested (simulation): {}", reason);
        self.requested.push(reason);
    }
}

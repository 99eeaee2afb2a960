//! Setup-portal request flag.
//!
//! The boot button toggles a single bit from interrupt context; the main
//! loop compares it against whether the portal is running and starts or
//! stops it.  Nothing else happens in the ISR.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct PortalFlag {
    requested: AtomicBool,
}

impl PortalFlag {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Flip the request.  Lock-free; safe to call from an ISR.
    pub fn toggle_from_isr(&self) {
        self.requested.fetch_xor(true, Ordering::AcqRel);
    }

    /// Force the request from task context, e.g. when boot found no
    /// usable WiFi credentials.
    pub fn set(&self, requested: bool) {
        self.requested.store(requested, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl Default for PortalFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Flag written by the boot-button interrupt.
pub static PORTAL_REQUEST: PortalFlag = PortalFlag::new();

/// Main-loop side: remembers whether the portal is running and reports the
/// edge the runtime has to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortalTracker {
    running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    Start,
    Stop,
}

impl PortalTracker {
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Compare the request against the running state.
    pub fn sync(&mut self, requested: bool) -> Option<PortalAction> {
        match (requested, self.running) {
            (true, false) => {
                self.running = true;
                Some(PortalAction::Start)
            }
            (false, true) => {
                self.running = false;
                Some(PortalAction::Stop)
            }
            _ => None,
        }
    }
}

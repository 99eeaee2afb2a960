//! One-shot GPIO setup for the setup-portal button.
//!
//! GPIO0 (the BOOT button) is an active-low input with pull-up.  Its
//! falling-edge ISR toggles [`PORTAL_REQUEST`]; the main loop picks the
//! change up on the next tick.

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;
#[cfg(target_os = "espidf")]
use crate::portal::PORTAL_REQUEST;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

// ── Edge debounce ─────────────────────────────────────────────

/// Contact bounce on the button lasts well under this.
pub const DEBOUNCE_MS: u32 = 50;

/// Timestamp of the last accepted edge, ms since boot (truncated).
static LAST_EDGE_MS: AtomicU32 = AtomicU32::new(0);

/// Whether an edge at `now_ms` is a new press after one at `last_ms`.
pub const fn is_new_press(last_ms: u32, now_ms: u32) -> bool {
    last_ms == 0 || now_ms.wrapping_sub(last_ms) >= DEBOUNCE_MS
}

/// Record an edge; returns `true` if it counts as a press.
/// Lock-free, callable from interrupt context.
pub fn accept_edge(now_ms: u32) -> bool {
    let last = LAST_EDGE_MS.load(Ordering::Acquire);
    if !is_new_press(last, now_ms) {
        return false;
    }
    // 0 is the "never" sentinel.
    LAST_EDGE_MS.store(now_ms.max(1), Ordering::Release);
    true
}

// ── GPIO ISR service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn portal_button_isr(_arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is a RTC counter read; safe in ISR context.
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
    if accept_edge(now_ms) {
        PORTAL_REQUEST.toggle_from_isr();
    }
}

/// Configure the button input and register its ISR.
#[cfg(target_os = "espidf")]
pub fn init_portal_button() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::PORTAL_BUTTON_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: called once from main() before the loop starts; the handler
    // only touches atomics.
    unsafe {
        let ret = gpio_config(&cfg);
        if ret != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(ret));
        }

        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        gpio_isr_handler_add(
            pins::PORTAL_BUTTON_GPIO,
            Some(portal_button_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(pins::PORTAL_BUTTON_GPIO);
    }
    info!("hw_init: portal button ISR on GPIO{}", pins::PORTAL_BUTTON_GPIO);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_portal_button() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): portal button ISR skipped");
    Ok(())
}

//! Peripheral drivers and one-shot hardware initialisation.

pub mod hw_init;
pub mod led_strip;

//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigStore`] as NUL-terminated strings in one NVS
//! namespace, the same flat keys the setup portal writes.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The simulation backend is a `HashMap` behind a `RefCell`.

use crate::app::ports::{ConfigError, ConfigStore};
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "co2ampel";

/// NVS key names are limited to 15 bytes.
const MAX_KEY_LEN: usize = 15;
/// Longest value accepted (update URLs).
#[cfg(target_os = "espidf")]
const MAX_VALUE_LEN: usize = 256;

pub struct NvsConfigStore {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, String>>,
}

impl NvsConfigStore {
    /// Initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably.  On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsConfigStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsConfigStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Copy `s` into a NUL-terminated buffer, truncating at `N - 1` bytes.
    #[cfg(target_os = "espidf")]
    fn c_buf<const N: usize>(s: &str) -> [u8; N] {
        let mut buf = [0u8; N];
        let len = s.len().min(N - 1);
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        buf
    }

    /// Open the config namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_buf::<16>(CONFIG_NAMESPACE);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl ConfigStore for NvsConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        if key.len() > MAX_KEY_LEN {
            return None;
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow().get(key).cloned()
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key_buf = Self::c_buf::<16>(key);
                let mut buf = [0u8; MAX_VALUE_LEN];
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_str(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // `size` includes the terminator.
                let text = core::str::from_utf8(&buf[..size.saturating_sub(1)])
                    .map_err(|_| ESP_FAIL)?;
                Ok(text.to_owned())
            });
            match result {
                Ok(v) => Some(v),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => None,
                Err(e) => {
                    warn!("NvsConfigStore: read of '{}' failed ({})", key, e);
                    None
                }
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if key.len() > MAX_KEY_LEN {
            return Err(ConfigError::ValidationFailed("NVS key longer than 15 bytes"));
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            if value.len() >= MAX_VALUE_LEN || value.contains('\0') {
                return Err(ConfigError::ValidationFailed("NVS value too long"));
            }
            let result = Self::with_nvs_handle(true, |handle| {
                let key_buf = Self::c_buf::<16>(key);
                let value_buf = Self::c_buf::<MAX_VALUE_LEN>(value);
                let ret = unsafe {
                    nvs_set_str(
                        handle,
                        key_buf.as_ptr() as *const _,
                        value_buf.as_ptr() as *const _,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NvsConfigStore: write of '{}' failed ({})", key, e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    ConfigError::StorageFull
                } else {
                    ConfigError::IoError
                }
            })
        }
    }
}

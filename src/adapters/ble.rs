//! BLE CO2 notifier.
//!
//! Implements [`EventSink`]: every valid measurement is written to a
//! single GATT characteristic as a decimal ppm string and notified to a
//! connected central.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw
//!   `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                     | Perms       |
//! |----------------|------------------------------------------|-------------|
//! | CO2 ppm        | `7ec161e2-396e-11eb-adc1-0242ac120002`   | Read+Notify |

use core::fmt::Write as _;
use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x7ec15f94_396e_11eb_adc1_0242ac120002;
pub const CHAR_CO2: u128 = 0x7ec161e2_396e_11eb_adc1_0242ac120002;

/// "65535" plus headroom.
const MAX_VALUE_BYTES: usize = 8;

pub type Co2Value = heapless::String<MAX_VALUE_BYTES>;

/// Characteristic payload for a reading: whole ppm, no unit.
pub fn format_ppm(ppm: f32) -> Co2Value {
    let mut s = Co2Value::new();
    let whole = ppm.clamp(0.0, f32::from(u16::MAX)) as u32;
    let _ = write!(s, "{}", whole);
    s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF BLE static state ──────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CO2_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);

#[cfg(target_os = "espidf")]
const CCCD_UUID16: u16 = 0x2902;

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: esp_bt_uuid_t is a plain C struct; all-zero is valid.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    };
    unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            unsafe { start_advertising() };
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(u32::from(gatts_if), AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // Service, characteristic, value and CCCD.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 4) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(u32::from(svc_handle), AtomicOrdering::Relaxed);
            let mut char_uuid = uuid128_to_esp(CHAR_CO2);
            let mut initial = *b"0";
            let mut value = esp_attr_value_t {
                attr_max_len: MAX_VALUE_BYTES as u16,
                attr_len: initial.len() as u16,
                attr_value: initial.as_mut_ptr(),
            };
            let mut control = esp_attr_control_t {
                auto_rsp: ESP_GATT_AUTO_RSP as u8,
            };
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut char_uuid,
                    ESP_GATT_PERM_READ as esp_gatt_perm_t,
                    (ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY)
                        as esp_gatt_char_prop_t,
                    &mut value,
                    &mut control,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            BLE_CO2_CHAR_HANDLE.store(u32::from(handle), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: CO2 char (handle={})", handle);
            // SAFETY: esp_bt_uuid_t is a plain C struct; all-zero is valid.
            let mut cccd: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
            cccd.len = 2;
            cccd.uuid.uuid16 = CCCD_UUID16;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            unsafe {
                esp_ble_gatts_add_char_descr(
                    svc_handle,
                    &mut cccd,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    core::ptr::null_mut(),
                    core::ptr::null_mut(),
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let conn_id = unsafe { (*param).connect.conn_id };
            BLE_CONN_ID.store(u32::from(conn_id), AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: client connected (conn_id={})", conn_id);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Release);
            log::info!("BLE GATTS: client disconnected");
            unsafe { start_advertising() };
        }
        _ => {}
    }
}

pub struct BleNotifier {
    state: BleState,
    device_name: heapless::String<32>,
    value: Co2Value,
    notifications: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
}

impl BleNotifier {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        let _ = name.push_str(device_name);
        Self {
            state: BleState::Idle,
            device_name: name,
            value: format_ppm(0.0),
            notifications: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_connected: false,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    /// Current characteristic value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn notifications(&self) -> u32 {
        self.notifications
    }

    pub fn start(&mut self) {
        info!("BLE: starting advertising as '{}'", self.device_name);
        self.state = if self.platform_start() {
            BleState::Advertising
        } else {
            BleState::Failed
        };
    }

    pub fn is_connected(&self) -> bool {
        self.state != BleState::Failed && self.platform_is_connected()
    }

    /// Store a new reading and notify a connected central.
    pub fn publish(&mut self, ppm: f32) {
        if self.state == BleState::Failed || self.state == BleState::Idle {
            return;
        }
        self.value = format_ppm(ppm);
        self.platform_set_value();
        if self.is_connected() {
            self.state = BleState::Connected;
            self.platform_notify();
            self.notifications = self.notifications.wrapping_add(1);
        } else {
            self.state = BleState::Advertising;
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let steps = [
                ("bt_controller_init", esp_bt_controller_init(&mut bt_cfg)),
                ("bt_controller_enable", esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE)),
                ("bluedroid_init", esp_bluedroid_init()),
                ("bluedroid_enable", esp_bluedroid_enable()),
            ];
            for (name, ret) in steps {
                if ret != ESP_OK {
                    log::error!("BLE: {} failed ({})", name, ret);
                    return false;
                }
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            let mut name = [0u8; 33];
            let len = self.device_name.len().min(32);
            name[..len].copy_from_slice(&self.device_name.as_bytes()[..len]);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            // Advertising starts once the data is set (GAP callback).
            let mut service_uuid = SERVICE_UUID.to_le_bytes();
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                min_interval: 0x0006,
                max_interval: 0x0010,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                service_uuid_len: service_uuid.len() as u16,
                p_service_uuid: service_uuid.as_mut_ptr(),
                ..core::mem::zeroed()
            };
            esp_ble_gap_config_adv_data(&mut adv_data);
        }
        info!("BLE(espidf): Bluedroid stack initialized");
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> bool {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        BLE_CONNECTED.load(AtomicOrdering::Acquire)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_connected
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_value(&mut self) {
        use esp_idf_svc::sys::*;
        let handle = BLE_CO2_CHAR_HANDLE.load(AtomicOrdering::Relaxed) as u16;
        if handle == 0 {
            return;
        }
        // SAFETY: Bluedroid copies the value before returning.
        unsafe {
            esp_ble_gatts_set_attr_value(handle, self.value.len() as u16, self.value.as_ptr());
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_value(&mut self) {}

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self) {
        use esp_idf_svc::sys::*;
        let handle = BLE_CO2_CHAR_HANDLE.load(AtomicOrdering::Relaxed) as u16;
        if handle == 0 {
            return;
        }
        unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                handle,
                self.value.len() as u16,
                self.value.as_ptr().cast_mut(),
                false,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self) {
        info!("BLE(sim): notify {} ppm", self.value);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_connected(&mut self, connected: bool) {
        self.sim_connected = connected;
    }
}

// ───────────────────────────────────────────────────────────────
// EventSink implementation
// ───────────────────────────────────────────────────────────────

impl EventSink for BleNotifier {
    fn emit(&mut self, event: &AppEvent) {
        if let AppEvent::Measurement(r) = event {
            if r.co2_valid() {
                self.publish(r.ppm);
            }
        }
    }
}

//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements           | Connects to                    |
//! |-------------|----------------------|--------------------------------|
//! | `ble`       | EventSink            | Bluedroid GATT server (notify) |
//! | `device_id` | -                    | eFuse MAC → name, AP password  |
//! | `hardware`  | SensorPort           | MH-Z19 UART, BME280 I2C        |
//! |             | DisplayPort          | WS2811 strip over RMT          |
//! | `http_ota`  | VersionSource        | HTTP client                    |
//! |             | FirmwareTransport    | HTTP client + OTA partition    |
//! | `influx`    | TelemetryPort        | InfluxDB v1 `/write`           |
//! | `log_sink`  | EventSink            | Serial log output              |
//! | `network`   | ConnectivityPort     | `wifi` + `influx` as one value |
//! |             | TelemetryPort        |                                |
//! | `nvs`       | ConfigStore          | NVS / in-memory store          |
//! | `restart`   | RestartPort          | `esp_restart`                  |
//! | `time`      | ClockPort            | ESP32 system timer             |
//! | `wifi`      | ConnectivityPort     | ESP-IDF WiFi STA + setup AP    |

pub mod ble;
pub mod device_id;
pub mod hardware;
pub mod http_ota;
pub mod influx;
pub mod log_sink;
pub mod network;
pub mod nvs;
pub mod restart;
pub mod time;
pub mod wifi;

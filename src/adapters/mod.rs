//! Adapters: concrete implementations of the port traits and transports.
//!
//! | Adapter            | Implements         | Connects to                  |
//! |--------------------|--------------------|------------------------------|
//! | `ble`              | GattServer         | Bluedroid GATT server        |
//! | `ble_transport`    | Transport          | any `GattServer`             |
//! | `socket_transport` | Transport          | TCP listener pair (lwIP)     |
//! | `serial_transport` | Transport          | any `SerialPort`             |
//! | `uart`             | SerialPort         | ESP32 UART driver            |
//! | `firmware`         | FirmwareTarget     | esp-ota / in-memory image    |
//! | `md5_digest`       | DigestAccumulator  | RustCrypto MD5               |
//! | `nvs`              | ConfigStore        | NVS blob (postcard)          |
//! | `time`             | Clock              | ESP32 system timer           |
//! | `time_driver`      | embassy Driver     | esp_timer / Instant + alarm  |
//! | `device_id`        | -                  | eFuse factory MAC            |
//! | `wifi`             | -                  | ESP-IDF WiFi STA (device)    |

pub mod ble;
pub mod ble_transport;
pub mod device_id;
pub mod firmware;
pub mod md5_digest;
pub mod nvs;
pub mod serial_transport;
pub mod socket_transport;
pub mod time;
pub mod time_driver;
pub mod uart;
#[cfg(target_os = "espidf")]
pub mod wifi;

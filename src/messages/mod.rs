//! NogasmLink device messages
//!
//! Typed views of the frames the device broadcasts on its status socket.
//! Decoding is lenient: missing fields fall back to their defaults.

mod types;

pub use types::{
    ArousalStatus, BleDevice, BleStatus, DeviceMessage, UpdateStatus, WifiInfo,
    AROUSAL_STATUS, BLE_STATUS, UPDATE_STATUS,
};

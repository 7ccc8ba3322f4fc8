//! Device message payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` of Bluetooth status frames
pub const BLE_STATUS: &str = "ble_status";
/// `type` of arousal sensor frames
pub const AROUSAL_STATUS: &str = "arousal_status";
/// `type` of firmware update progress frames
pub const UPDATE_STATUS: &str = "update_status";

/// Bluetooth connection status of the paired toy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BleStatus {
    pub scanning: bool,
    pub connected: bool,
    /// Numeric BLE state machine value
    pub state: i64,
    pub state_string: String,
    pub device: Option<BleDevice>,
    pub wifi: Option<WifiInfo>,
}

/// The currently selected toy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BleDevice {
    pub name: String,
    pub address: String,
    pub address_type: i64,
    /// Battery percentage
    pub battery: i64,
    pub model: String,
    pub firmware_version: String,
    pub rssi: i64,
}

/// Device Wi-Fi link quality
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiInfo {
    pub rssi: i64,
}

/// Arousal tracking snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArousalStatus {
    pub active: bool,
    pub arousal_percent: f64,
    pub pressure: f64,
    pub limit: f64,
    pub limit_exceeded_counter: u64,
    pub sensitivity: f64,
    /// Milliseconds since the session started
    pub current_session_duration: u64,
    pub clench_threshold: f64,
    /// Milliseconds
    pub last_clench_duration: u64,
    pub state: String,
}

/// Firmware update progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateStatus {
    pub active: bool,
    pub state: i64,
    pub mode: i64,
    pub percentage: f64,
    pub current: u64,
    pub total: u64,
    pub error: String,
    pub has_error: bool,
    pub md5_hash: String,
    pub hostname: Option<String>,
    pub ip: Option<String>,
}

/// A decoded device frame
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Ble(BleStatus),
    Arousal(ArousalStatus),
    Update(UpdateStatus),
}

impl DeviceMessage {
    /// Decode a parsed frame; `Ok(None)` for types that are not device messages
    pub fn from_value(value: &Value) -> Result<Option<Self>, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let message = match kind {
            BLE_STATUS => DeviceMessage::Ble(BleStatus::deserialize(value)?),
            AROUSAL_STATUS => DeviceMessage::Arousal(ArousalStatus::deserialize(value)?),
            UPDATE_STATUS => DeviceMessage::Update(UpdateStatus::deserialize(value)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Wire `type` of this message
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceMessage::Ble(_) => BLE_STATUS,
            DeviceMessage::Arousal(_) => AROUSAL_STATUS,
            DeviceMessage::Update(_) => UPDATE_STATUS,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        match self {
            DeviceMessage::Ble(s) => {
                let device = s
                    .device
                    .as_ref()
                    .map(|d| format!(" {} ({}%)", d.name, d.battery))
                    .unwrap_or_default();
                format!("BLE {}{}", s.state_string, device)
            }
            DeviceMessage::Arousal(s) => format!(
                "Arousal {:.1}% pressure {:.0} [{}]",
                s.arousal_percent, s.pressure, s.state
            ),
            DeviceMessage::Update(s) if s.has_error => format!("Update failed: {}", s.error),
            DeviceMessage::Update(s) => format!("Update {:.0}% ({}/{})", s.percentage, s.current, s.total),
        }
    }
}

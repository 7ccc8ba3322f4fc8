//! Connection state and its presentation helpers

use std::fmt;

/// CSS class used by the console for a healthy connection
pub const STYLE_SUCCESS: &str = "bg-success";
/// CSS class for a connection that is being (re)established
pub const STYLE_WARNING: &str = "bg-warning";
/// CSS class for a connection that is down
pub const STYLE_DANGER: &str = "bg-danger";

/// Current state of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport and no pending reconnect
    #[default]
    Disconnected,
    /// A transport is being opened
    Connecting,
    /// The transport is open
    Connected,
    /// The last attempt failed
    Error,
    /// Waiting `delay_ms` before the next attempt
    Reconnecting { delay_ms: u64 },
}

impl ConnectionState {
    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a reconnect is pending
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionState::Reconnecting { .. })
    }

    /// Style class for status badges
    pub fn style_class(&self) -> &'static str {
        match self {
            ConnectionState::Connected => STYLE_SUCCESS,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => STYLE_WARNING,
            ConnectionState::Disconnected | ConnectionState::Error => STYLE_DANGER,
        }
    }

    /// Human readable label
    ///
    /// The reconnect delay is shown in whole seconds, rounded half-up.
    pub fn label(&self) -> String {
        match self {
            ConnectionState::Connected => "Websocket Connected".to_string(),
            ConnectionState::Connecting => "Websocket Connecting".to_string(),
            ConnectionState::Disconnected => "Websocket Disconnected".to_string(),
            ConnectionState::Error => "Websocket Error".to_string(),
            ConnectionState::Reconnecting { delay_ms } => {
                format!("Websocket Reconnecting in {}s", round_to_secs(*delay_ms))
            }
        }
    }

    /// Numeric code exported as a gauge
    pub(crate) fn code(&self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
            ConnectionState::Error => 3.0,
            ConnectionState::Reconnecting { .. } => 4.0,
        }
    }
}

fn round_to_secs(delay_ms: u64) -> u64 {
    delay_ms.saturating_add(500) / 1000
}

/// Status string as shown on the status channel, e.g. `reconnecting:400`
impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
            ConnectionState::Reconnecting { delay_ms } => write!(f, "reconnecting:{}", delay_ms),
        }
    }
}

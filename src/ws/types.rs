//! WebSocket types and configuration

use super::backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::http::Uri;

/// Path of the status socket on the device
pub const SOCKET_PATH: &str = "/ws";

/// Socket endpoint derived from the origin of the hosting page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    secure: bool,
    host: String,
}

impl Endpoint {
    /// Create an endpoint for a host (with optional port)
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// Derive the endpoint from a page origin such as `https://nogasm.local:8443`
    ///
    /// Secure pages (`https`) get a secure socket. Any path on the origin is ignored.
    pub fn from_origin(origin: &str) -> Result<Self, WsError> {
        let uri: Uri = origin
            .trim()
            .parse()
            .map_err(|e| WsError::InvalidEndpoint(format!("{}: {}", origin, e)))?;

        let secure = match uri.scheme_str() {
            Some("https") | Some("wss") => true,
            Some("http") | Some("ws") => false,
            Some(other) => {
                return Err(WsError::InvalidEndpoint(format!(
                    "unsupported scheme '{}' in {}",
                    other, origin
                )))
            }
            None => {
                return Err(WsError::InvalidEndpoint(format!(
                    "missing scheme in {}",
                    origin
                )))
            }
        };

        let host = uri
            .authority()
            .map(|a| a.as_str())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| WsError::InvalidEndpoint(format!("missing host in {}", origin)))?;

        Ok(Self::new(host, secure))
    }

    /// Whether the socket uses TLS
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host and optional port
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full socket URL, e.g. `wss://nogasm.local/ws`
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, SOCKET_PATH)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Socket endpoint
    pub endpoint: Endpoint,
    /// Delay before the first reconnect attempt
    pub base_delay: Duration,
    /// Maximum delay between reconnect attempts
    pub max_delay: Duration,
    /// Schedule reconnects after a loss
    pub auto_reconnect: bool,
}

impl WsConfig {
    /// Create a config for the given endpoint with default backoff
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            auto_reconnect: true,
        }
    }

    /// Set the first reconnect delay
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Set the reconnect delay cap
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Enable or disable automatic reconnects
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Backoff policy for this config
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay)
    }
}

/// WebSocket errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WsError {
    /// Origin could not be turned into a socket URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// The transport could not be created
    #[error("Transport construction failed: {0}")]
    TransportConstruction(String),
    /// The transport reported an error before or after opening
    #[error("Connection failed: {0}")]
    OpenFailed(String),
    /// The transport closed without ever opening
    #[error("Connection closed before opening")]
    ClosedBeforeOpen,
    /// The attempt was discarded by an explicit disconnect
    #[error("Connection attempt aborted")]
    Aborted,
    /// The manager's driver is gone
    #[error("Connection manager has shut down")]
    ManagerClosed,
}

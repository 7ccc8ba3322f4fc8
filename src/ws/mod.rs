//! WebSocket connection management
//!
//! Keeps one logical connection to the device's status socket alive with
//! exponential backoff, and fans inbound JSON frames out to subscribers by
//! their `type` field. Connection state changes are published on the
//! reserved `status` topic.

mod backoff;
mod dispatch;
mod manager;
mod registry;
mod status;
mod transport;
mod types;

pub use backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use manager::{ConnectionManager, WeakConnectionManager};
pub use registry::{
    subscribe, Callback, Notification, SharedRegistry, Subscription, SubscriptionId,
    SubscriptionRegistry, Topic, STATUS_TOPIC,
};
pub use status::{ConnectionState, STYLE_DANGER, STYLE_SUCCESS, STYLE_WARNING};
pub use transport::{Connector, TransportEvent, TransportHandle, TransportPeer, TungsteniteConnector};
pub use types::{Endpoint, WsConfig, WsError, SOCKET_PATH};

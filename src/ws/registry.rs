//! Subscription registry keyed by message type

use super::status::ConnectionState;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Reserved key for connection status notifications
pub const STATUS_TOPIC: &str = "status";

/// Subscriber callback
///
/// Returning an error (or panicking) is logged by the dispatcher and does not
/// affect other subscribers.
pub type Callback = Arc<dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync>;

/// Registry shared between the manager handle and its driver
pub type SharedRegistry = Arc<Mutex<SubscriptionRegistry>>;

/// Key a subscriber registers under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Connection state changes
    Status,
    /// Server messages with the given `type`
    Message(String),
}

impl Topic {
    /// Key as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Topic::Status => STATUS_TOPIC,
            Topic::Message(kind) => kind,
        }
    }
}

impl From<&str> for Topic {
    fn from(kind: &str) -> Self {
        if kind == STATUS_TOPIC {
            Topic::Status
        } else {
            Topic::Message(kind.to_string())
        }
    }
}

impl From<String> for Topic {
    fn from(kind: String) -> Self {
        if kind == STATUS_TOPIC {
            Topic::Status
        } else {
            Topic::Message(kind)
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// New connection state
    Status(ConnectionState),
    /// Full parsed server message
    Message(Value),
}

impl Notification {
    /// Connection state, if this is a status notification
    pub fn as_status(&self) -> Option<&ConnectionState> {
        match self {
            Notification::Status(state) => Some(state),
            Notification::Message(_) => None,
        }
    }

    /// Message payload, if this is a server message
    pub fn as_message(&self) -> Option<&Value> {
        match self {
            Notification::Message(value) => Some(value),
            Notification::Status(_) => None,
        }
    }
}

/// Identifies one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    callback: Callback,
}

/// Ordered subscriber lists per topic
pub struct SubscriptionRegistry {
    topics: HashMap<Topic, Vec<Entry>>,
    next_id: u64,
}

impl SubscriptionRegistry {
    /// Create a registry with the status topic present
    pub fn new() -> Self {
        let mut topics = HashMap::new();
        topics.insert(Topic::Status, Vec::new());
        Self { topics, next_id: 0 }
    }

    /// Wrap a new registry for sharing
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a callback to a topic, creating the topic if needed
    pub fn subscribe(&mut self, topic: Topic, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.topics
            .entry(topic)
            .or_default()
            .push(Entry { id, callback });
        id
    }

    /// Remove one registration; returns whether it was present
    pub fn unsubscribe(&mut self, topic: &Topic, id: SubscriptionId) -> bool {
        let Some(entries) = self.topics.get_mut(topic) else {
            return false;
        };
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the topic has a subscriber list (possibly empty)
    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of subscribers on a topic
    pub fn len(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Whether nobody subscribed to anything
    pub fn is_empty(&self) -> bool {
        self.topics.values().all(Vec::is_empty)
    }

    /// Snapshot of a topic's callbacks in invocation order
    ///
    /// `None` when the topic was never registered.
    pub fn callbacks(&self, topic: &Topic) -> Option<Vec<Callback>> {
        self.topics
            .get(topic)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.callback)).collect())
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .topics
            .iter()
            .map(|(topic, entries)| (topic.as_str(), entries.len()))
            .collect();
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &counts)
            .finish()
    }
}

/// Lock the shared registry, recovering from a poisoned lock
pub(crate) fn lock(registry: &SharedRegistry) -> MutexGuard<'_, SubscriptionRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capability to remove one registration
///
/// Dropping it keeps the subscription alive.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<SubscriptionRegistry>>,
    topic: Topic,
    id: SubscriptionId,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(registry: &SharedRegistry, topic: Topic, id: SubscriptionId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            topic,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Topic this subscription is registered under
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the registration; later calls do nothing
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).unsubscribe(&self.topic, self.id);
        }
    }
}

/// Register a callback on a shared registry
pub fn subscribe<F>(registry: &SharedRegistry, topic: impl Into<Topic>, callback: F) -> Subscription
where
    F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let topic = topic.into();
    let id = lock(registry).subscribe(topic.clone(), Arc::new(callback));
    tracing::debug!(topic = %topic, "Subscriber added");
    Subscription::new(registry, topic, id)
}

//! Routes inbound frames and status changes to subscribers

use super::registry::{self, Callback, Notification, SharedRegistry, Topic};
use super::status::ConnectionState;
use crate::telemetry::{increment, CounterMetric};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};

/// Result of routing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame reached the subscribers of `topic`
    Delivered {
        topic: String,
        subscribers: usize,
        failures: usize,
    },
    /// No `type`, or no current subscribers for it
    Unrouted,
    /// Not valid JSON
    Malformed,
}

/// Delivers notifications with per-subscriber failure isolation
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Parse one text frame and hand it to the subscribers of its `type`
    pub fn dispatch_frame(&self, text: &str) -> DispatchOutcome {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    preview = %text.chars().take(100).collect::<String>(),
                    "Dropping malformed frame"
                );
                increment(CounterMetric::MalformedFrames);
                return DispatchOutcome::Malformed;
            }
        };

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            tracing::trace!("Frame without type");
            increment(CounterMetric::UnroutedFrames);
            return DispatchOutcome::Unrouted;
        };

        // Server frames never reach the status channel
        let topic = match Topic::from(kind) {
            Topic::Status => {
                tracing::debug!("Ignoring server frame typed as status");
                increment(CounterMetric::UnroutedFrames);
                return DispatchOutcome::Unrouted;
            }
            topic => topic,
        };

        let callbacks = registry::lock(&self.registry)
            .callbacks(&topic)
            .unwrap_or_default();
        if callbacks.is_empty() {
            tracing::trace!(topic = %topic, "No subscribers for frame");
            increment(CounterMetric::UnroutedFrames);
            return DispatchOutcome::Unrouted;
        }

        let notification = Notification::Message(value);
        let failures = deliver(&topic, &callbacks, &notification);
        increment(CounterMetric::FramesDispatched);

        DispatchOutcome::Delivered {
            topic: topic.to_string(),
            subscribers: callbacks.len(),
            failures,
        }
    }

    /// Notify status subscribers of a new state; returns the failure count
    pub fn broadcast_status(&self, state: ConnectionState) -> usize {
        let callbacks = registry::lock(&self.registry)
            .callbacks(&Topic::Status)
            .unwrap_or_default();
        deliver(&Topic::Status, &callbacks, &Notification::Status(state))
    }
}

/// Invoke each callback, containing errors and panics
fn deliver(topic: &Topic, callbacks: &[Callback], notification: &Notification) -> usize {
    let mut failures = 0;
    for (index, callback) in callbacks.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(notification))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                increment(CounterMetric::SubscriberFailures);
                tracing::warn!(topic = %topic, subscriber = index, error = %e, "Subscriber failed");
            }
            Err(payload) => {
                failures += 1;
                increment(CounterMetric::SubscriberFailures);
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(topic = %topic, subscriber = index, %reason, "Subscriber panicked");
            }
        }
    }
    failures
}

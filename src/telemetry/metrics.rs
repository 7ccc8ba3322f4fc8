//! Prometheus metrics

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Transports opened (manual and scheduled)
    ConnectAttempts,
    /// Reconnects scheduled after a loss
    ReconnectsScheduled,
    /// Frames delivered to a topic
    FramesDispatched,
    /// Frames that were not valid JSON
    MalformedFrames,
    /// Frames without a known type
    UnroutedFrames,
    /// Subscriber callbacks that failed or panicked
    SubscriberFailures,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current connection state code
    ConnectionState,
    /// Most recently scheduled reconnect delay
    ReconnectDelayMs,
}

impl CounterMetric {
    /// Exported metric name
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::ConnectAttempts => "nogasm_ws_connect_attempts_total",
            CounterMetric::ReconnectsScheduled => "nogasm_ws_reconnects_scheduled_total",
            CounterMetric::FramesDispatched => "nogasm_ws_frames_dispatched_total",
            CounterMetric::MalformedFrames => "nogasm_ws_malformed_frames_total",
            CounterMetric::UnroutedFrames => "nogasm_ws_unrouted_frames_total",
            CounterMetric::SubscriberFailures => "nogasm_ws_subscriber_failures_total",
        }
    }
}

impl GaugeMetric {
    /// Exported metric name
    pub fn name(self) -> &'static str {
        match self {
            GaugeMetric::ConnectionState => "nogasm_ws_connection_state",
            GaugeMetric::ReconnectDelayMs => "nogasm_ws_reconnect_delay_ms",
        }
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

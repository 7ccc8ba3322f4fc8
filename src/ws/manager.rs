//! Connection lifecycle manager
//!
//! [`ConnectionManager`] is a cloneable handle to a single driver task. The
//! driver owns the transport handle, the reconnect timer and the connection
//! state, and processes API commands, transport events and timer firings one
//! at a time. Subscriber callbacks run on the driver and may call back into
//! the manager through a [`WeakConnectionManager`]; such calls are queued
//! behind the event being handled.

use super::backoff::Backoff;
use super::dispatch::Dispatcher;
use super::registry::{self, Notification, SharedRegistry, Subscription, SubscriptionRegistry};
use super::status::ConnectionState;
use super::transport::{Connector, TransportEvent, TransportHandle};
use super::types::{WsConfig, WsError};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;

type Reply = oneshot::Sender<Result<(), WsError>>;

enum Command {
    Connect(Reply),
    Disconnect(oneshot::Sender<()>),
}

/// Handle to the single managed connection
///
/// Clones share the same connection. Must be created inside a Tokio runtime;
/// the driver stops once every clone is dropped. Callbacks that need to reach
/// the manager should capture a [`WeakConnectionManager`], since a clone stored
/// in the registry keeps the driver alive.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    registry: SharedRegistry,
    status: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
}

impl ConnectionManager {
    /// Create the manager and spawn its driver
    pub fn new<C: Connector>(config: WsConfig, connector: C) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let registry = SubscriptionRegistry::shared();
        let attempts = Arc::new(AtomicU32::new(0));

        let driver = Driver {
            backoff: config.backoff(),
            url: config.endpoint.url(),
            auto_reconnect: config.auto_reconnect,
            connector,
            commands: command_rx,
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            status: status_tx,
            state: ConnectionState::Disconnected,
            attempts: Arc::clone(&attempts),
            active: None,
            reconnect_timer: None,
            next_attempt: 0,
        };
        tokio::spawn(driver.run());

        Self {
            commands: command_tx,
            registry,
            status: status_rx,
            attempts,
        }
    }

    /// Open the connection
    ///
    /// The attempt starts immediately, whether or not the returned future is
    /// awaited. Resolves once on the first open (`Ok`) or failure. While
    /// connected this resolves `Ok` without a new attempt; while connecting it
    /// joins the attempt in flight.
    pub fn connect(&self) -> impl Future<Output = Result<(), WsError>> + Send + 'static {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.commands.send(Command::Connect(reply_tx)).is_ok();
        async move {
            if !sent {
                return Err(WsError::ManagerClosed);
            }
            reply_rx.await.unwrap_or(Err(WsError::Aborted))
        }
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// The request is queued immediately, whether or not the returned future
    /// is awaited. [`status`](Self::status) is only guaranteed to read
    /// `Disconnected` once the future resolves; until then it may still report
    /// the previous state.
    pub fn disconnect(&self) -> impl Future<Output = ()> + Send + 'static {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = self.commands.send(Command::Disconnect(ack_tx)).is_ok();
        async move {
            if sent {
                let _ = ack_rx.await;
            }
        }
    }

    /// Register a callback for a message type, or `"status"` for state changes
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        registry::subscribe(&self.registry, topic, callback)
    }

    /// Register a callback for connection state changes
    pub fn subscribe_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        registry::subscribe(&self.registry, registry::STATUS_TOPIC, move |n| match n {
            Notification::Status(state) => callback(*state),
            Notification::Message(_) => Ok(()),
        })
    }

    /// Current connection state
    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Receiver that observes every published state
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Consecutive reconnect attempts since the last open or disconnect
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Handle that does not keep the driver alive
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            commands: self.commands.downgrade(),
            registry: Arc::downgrade(&self.registry),
            status: self.status.clone(),
            attempts: Arc::clone(&self.attempts),
        }
    }
}

/// Non-owning handle, for subscriber callbacks that call back into the manager
#[derive(Clone)]
pub struct WeakConnectionManager {
    commands: mpsc::WeakUnboundedSender<Command>,
    registry: Weak<Mutex<SubscriptionRegistry>>,
    status: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
}

impl WeakConnectionManager {
    /// Full handle, or `None` once every [`ConnectionManager`] is gone
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        Some(ConnectionManager {
            commands: self.commands.upgrade()?,
            registry: self.registry.upgrade()?,
            status: self.status.clone(),
            attempts: Arc::clone(&self.attempts),
        })
    }
}

impl std::fmt::Debug for WeakConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakConnectionManager")
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

/// The live transport and the callers waiting on its first outcome
struct ActiveTransport {
    attempt: u64,
    transport: TransportHandle,
    waiters: Vec<Reply>,
    opened: bool,
}

struct Driver<C> {
    connector: C,
    url: String,
    auto_reconnect: bool,
    backoff: Backoff,
    commands: mpsc::UnboundedReceiver<Command>,
    dispatcher: Dispatcher,
    status: watch::Sender<ConnectionState>,
    state: ConnectionState,
    attempts: Arc<AtomicU32>,
    active: Option<ActiveTransport>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    next_attempt: u64,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        tracing::debug!(url = %self.url, "Connection manager started");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Connect(reply)) => self.connect(Some(reply)),
                    Some(Command::Disconnect(ack)) => {
                        self.disconnect();
                        let _ = ack.send(());
                    }
                    None => break,
                },

                event = next_event(&mut self.active) => self.handle_event(event),

                () = wait_timer(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    tracing::debug!(attempt = self.backoff.attempts(), "Reconnect timer fired");
                    self.connect(None);
                }
            }
        }

        self.cancel_reconnect();
        self.teardown();
        tracing::debug!("Connection manager stopped");
    }

    fn connect(&mut self, reply: Option<Reply>) {
        if let Some(active) = self.active.as_mut() {
            if active.opened {
                tracing::debug!("Already connected");
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            } else {
                tracing::debug!(attempt = active.attempt, "Connection attempt already in flight");
                active.waiters.extend(reply);
            }
            return;
        }

        self.cancel_reconnect();
        self.next_attempt += 1;
        let attempt = self.next_attempt;

        self.set_state(ConnectionState::Connecting);
        increment(CounterMetric::ConnectAttempts);
        tracing::info!(url = %self.url, attempt, "Opening WebSocket");

        match self.connector.open(&self.url) {
            Ok(transport) => {
                self.active = Some(ActiveTransport {
                    attempt,
                    transport,
                    waiters: reply.into_iter().collect(),
                    opened: false,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Could not create WebSocket");
                self.set_state(ConnectionState::Error);
                self.schedule_reconnect();
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    fn disconnect(&mut self) {
        self.cancel_reconnect();
        self.teardown();
        self.backoff.reset();
        self.publish_attempts();
        if self.state != ConnectionState::Disconnected {
            tracing::info!("WebSocket disconnected");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn handle_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => self.on_open(),
            Some(TransportEvent::Message(text)) => {
                self.dispatcher.dispatch_frame(&text);
            }
            Some(TransportEvent::Error(reason)) => self.on_error(reason),
            Some(TransportEvent::Close { code, reason }) => self.on_close(code, reason),
            None => self.on_close(None, "transport ended".to_string()),
        }
    }

    fn on_open(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.opened = true;
        tracing::info!(attempt = active.attempt, "WebSocket connected");

        self.backoff.reset();
        self.publish_attempts();
        self.set_state(ConnectionState::Connected);
        self.settle(Ok(()));
    }

    /// Errors leave the transport in an unknown state, so it is torn down
    fn on_error(&mut self, reason: String) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::warn!(attempt = active.attempt, error = %reason, "WebSocket error");
        if active.waiters.is_empty() && !active.opened {
            tracing::warn!(attempt = active.attempt, "Reconnection attempt failed");
        }

        self.set_state(ConnectionState::Error);
        active.transport.close();
        self.schedule_reconnect();

        let failure = WsError::OpenFailed(reason);
        for waiter in active.waiters {
            let _ = waiter.send(Err(failure.clone()));
        }
    }

    /// The transport is already closed; drop it without a close request
    fn on_close(&mut self, code: Option<u16>, reason: String) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::info!(attempt = active.attempt, ?code, %reason, "WebSocket closed");

        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();

        for waiter in active.waiters {
            let _ = waiter.send(Err(WsError::ClosedBeforeOpen));
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect {
            tracing::debug!("Automatic reconnect disabled");
            return;
        }
        self.cancel_reconnect();

        let delay = self.backoff.next_delay();
        self.publish_attempts();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        increment(CounterMetric::ReconnectsScheduled);
        set_gauge(GaugeMetric::ReconnectDelayMs, delay_ms as f64);
        tracing::info!(delay_ms, attempt = self.backoff.attempts(), "Scheduling reconnect");

        self.set_state(ConnectionState::Reconnecting { delay_ms });
        self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn cancel_reconnect(&mut self) {
        if self.reconnect_timer.take().is_some() {
            tracing::debug!("Pending reconnect cancelled");
        }
    }

    /// Detach from the live transport and ask it to close
    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(attempt = active.attempt, "Detaching transport");
            for waiter in active.waiters {
                let _ = waiter.send(Err(WsError::Aborted));
            }
            active.transport.close();
        }
    }

    /// Resolve everyone waiting on the live attempt
    fn settle(&mut self, result: Result<(), WsError>) {
        if let Some(active) = self.active.as_mut() {
            for waiter in active.waiters.drain(..) {
                let _ = waiter.send(result.clone());
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        tracing::debug!(from = %self.state, to = %state, "Connection state changed");
        self.state = state;
        self.status.send_replace(state);
        set_gauge(GaugeMetric::ConnectionState, state.code());
        self.dispatcher.broadcast_status(state);
    }

    fn publish_attempts(&self) {
        self.attempts.store(self.backoff.attempts(), Ordering::Release);
    }
}

async fn next_event(active: &mut Option<ActiveTransport>) -> Option<TransportEvent> {
    match active {
        Some(active) => active.transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

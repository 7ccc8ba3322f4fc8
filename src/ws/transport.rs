//! Transport seam between the connection manager and the socket
//!
//! A [`Connector`] opens one [`TransportHandle`] per connection attempt. The
//! transport side of the pair ([`TransportPeer`]) reports [`TransportEvent`]s;
//! the manager consumes them until it drops the handle, after which nothing the
//! peer sends is observed and the peer sees a close request.

use super::types::WsError;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Events reported by a transport, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open
    Open,
    /// A text frame arrived
    Message(String),
    /// The socket failed
    Error(String),
    /// The socket closed
    Close { code: Option<u16>, reason: String },
}

/// Opens transports for the connection manager
pub trait Connector: Send + Sync + 'static {
    /// Start opening a transport to `url`
    ///
    /// Failing here is a construction failure; failures while opening are
    /// reported later as [`TransportEvent::Error`].
    fn open(&self, url: &str) -> Result<TransportHandle, WsError>;
}

/// Manager side of one connection attempt
#[derive(Debug)]
pub struct TransportHandle {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    close: Option<oneshot::Sender<()>>,
}

impl TransportHandle {
    /// Create a connected handle/peer pair
    pub fn pair() -> (TransportHandle, TransportPeer) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        (
            TransportHandle {
                events: event_rx,
                close: Some(close_tx),
            },
            TransportPeer {
                events: event_tx,
                close: Some(close_rx),
            },
        )
    }

    /// Next event, or `None` once the peer is gone
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Detach from the peer and ask it to close
    pub fn close(mut self) {
        self.events.close();
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Transport side of one connection attempt
#[derive(Debug)]
pub struct TransportPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    close: Option<oneshot::Receiver<()>>,
}

impl TransportPeer {
    /// Report the socket as open
    pub fn open(&self) {
        self.emit(TransportEvent::Open);
    }

    /// Report a text frame
    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    /// Report a failure
    pub fn error(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Error(reason.into()));
    }

    /// Report the socket as closed
    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        self.emit(TransportEvent::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Whether the manager has stopped listening to this peer
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }

    /// Whether the manager asked for the socket to be closed
    pub fn close_requested(&mut self) -> bool {
        match self.close.as_mut() {
            None => true,
            Some(rx) => match rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => false,
                _ => {
                    self.close = None;
                    true
                }
            },
        }
    }

    /// Resolve once the manager asks for the socket to be closed
    pub async fn wait_close_request(&mut self) {
        if let Some(rx) = self.close.as_mut() {
            let _ = rx.await;
            self.close = None;
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Transport event dropped, handle detached");
        }
    }
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    keepalive: Option<Duration>,
}

impl TungsteniteConnector {
    /// Create a connector without keepalive pings
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a ping every `interval`; a missing pong by the next tick fails the socket
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval).filter(|d| !d.is_zero());
        self
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str) -> Result<TransportHandle, WsError> {
        let request = url
            .into_client_request()
            .map_err(|e| WsError::TransportConstruction(format!("{}: {}", url, e)))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WsError::TransportConstruction(e.to_string()))?;

        let (handle, peer) = TransportHandle::pair();
        runtime.spawn(run_socket(request, peer, self.keepalive));
        Ok(handle)
    }
}

/// Drive one socket, translating it into transport events
async fn run_socket(request: Request, mut peer: TransportPeer, keepalive: Option<Duration>) {
    let uri = request.uri().to_string();

    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::debug!(url = %uri, error = %e, "WebSocket handshake failed");
                peer.error(e.to_string());
                peer.closed(None, "handshake failed");
                return;
            }
        },
        _ = peer.wait_close_request() => {
            tracing::debug!(url = %uri, "Close requested while opening");
            return;
        }
    };

    peer.open();
    let (mut write, mut read) = ws_stream.split();

    let mut ping_interval = tokio::time::interval(keepalive.unwrap_or(Duration::from_secs(3600)));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately
    ping_interval.tick().await;
    let mut waiting_for_pong = false;

    loop {
        tokio::select! {
            _ = peer.wait_close_request() => {
                let _ = write.send(Message::Close(None)).await;
                tracing::debug!(url = %uri, "WebSocket closed on request");
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => peer.message(text),
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            peer.error(e.to_string());
                            peer.closed(None, "pong failed");
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        waiting_for_pong = false;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                            .unwrap_or((None, String::new()));
                        peer.closed(code, reason);
                        return;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        peer.error(e.to_string());
                        peer.closed(None, "stream error");
                        return;
                    }
                    None => {
                        peer.closed(None, "stream ended");
                        return;
                    }
                }
            }

            _ = ping_interval.tick(), if keepalive.is_some() => {
                if waiting_for_pong {
                    peer.error("Pong timeout");
                    peer.closed(None, "pong timeout");
                    return;
                }
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    peer.error(e.to_string());
                    peer.closed(None, "ping failed");
                    return;
                }
                waiting_for_pong = true;
            }
        }
    }
}

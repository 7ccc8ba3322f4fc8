//! nogasm-ws: Resilient WebSocket status client for NogasmLink devices
//!
//! This library provides:
//! - A single-connection manager with exponential backoff reconnects
//! - Topic-based subscriptions with failure-isolated dispatch
//! - Connection status presentation helpers
//! - Typed device status messages
//! - Configuration, CLI and observability stack

pub mod cli;
pub mod config;
pub mod messages;
pub mod telemetry;
pub mod ws;

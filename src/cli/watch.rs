//! Watch command implementation

use crate::config::Config;
use crate::messages::{DeviceMessage, AROUSAL_STATUS, BLE_STATUS, UPDATE_STATUS};
use crate::ws::{ConnectionManager, Notification, Subscription, TungsteniteConnector};
use clap::Args;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Console origin, overrides the configuration file
    #[arg(long)]
    pub origin: Option<String>,

    /// Message type to follow (repeatable, defaults to all device messages)
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,
}

impl WatchArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(origin) = &self.origin {
            config.connection.origin = origin.clone();
        }

        let ws_config = config.ws_config()?;
        let mut connector = TungsteniteConnector::new();
        if let Some(interval) = config.keepalive.interval() {
            connector = connector.keepalive(interval);
        }

        tracing::info!(url = %ws_config.endpoint, "Watching device");
        let manager = ConnectionManager::new(ws_config, connector);

        let _status = manager.subscribe_status(|state| {
            tracing::info!(status = %state, style = state.style_class(), "{}", state.label());
            Ok(())
        });
        let _messages: Vec<Subscription> = self
            .topics()
            .iter()
            .map(|topic| manager.subscribe(topic, log_message))
            .collect();

        let connecting = manager.connect();
        tokio::spawn(async move {
            if let Err(e) = connecting.await {
                tracing::warn!(error = %e, "Initial connection failed, retrying in background");
            }
        });

        tokio::signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal");
        manager.disconnect().await;

        Ok(())
    }

    fn topics(&self) -> Vec<String> {
        if self.topics.is_empty() {
            [BLE_STATUS, AROUSAL_STATUS, UPDATE_STATUS]
                .iter()
                .map(|t| t.to_string())
                .collect()
        } else {
            self.topics.clone()
        }
    }
}

fn log_message(notification: &Notification) -> anyhow::Result<()> {
    let Some(value) = notification.as_message() else {
        return Ok(());
    };
    match DeviceMessage::from_value(value)? {
        Some(message) => tracing::info!(kind = message.kind(), "{}", message.summary()),
        None => tracing::info!(payload = %value, "Message"),
    }
    Ok(())
}

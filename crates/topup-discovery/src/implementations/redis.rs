//! Redis pub/sub confirmation source.
//!
//! Subscribes to a channel on which the payment subsystem publishes confirm
//! payloads as JSON. A dropped subscription is re-established after a short
//! pause until the source is stopped.

use crate::{decode_confirmation, ConfirmationSourceInterface, DiscoveryError};
use async_trait::async_trait;
use futures::StreamExt;
use redis::Client;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use topup_types::{ConfigSchema, Field, FieldType, OrderConfirmRequest, Schema, ValidationError};

const DEFAULT_CHANNEL: &str = "order.confirm";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct RedisConfirmationSource {
	client: Client,
	channel: String,
	stop_signal: Mutex<Option<watch::Sender<bool>>>,
}

impl RedisConfirmationSource {
	pub fn new(redis_url: &str, channel: impl Into<String>) -> Result<Self, DiscoveryError> {
		let client = Client::open(redis_url)
			.map_err(|e| DiscoveryError::Configuration(format!("Invalid Redis URL: {e}")))?;
		Ok(Self {
			client,
			channel: channel.into(),
			stop_signal: Mutex::new(None),
		})
	}

	/// Forwards messages until the subscription drops or a stop is requested.
	/// Returns true when stopped.
	async fn pump(
		client: &Client,
		channel: &str,
		sender: &mpsc::UnboundedSender<OrderConfirmRequest>,
		stop_rx: &mut watch::Receiver<bool>,
	) -> Result<bool, DiscoveryError> {
		let mut pubsub = client
			.get_async_pubsub()
			.await
			.map_err(|e| DiscoveryError::Connection(e.to_string()))?;
		pubsub
			.subscribe(channel)
			.await
			.map_err(|e| DiscoveryError::Connection(e.to_string()))?;
		tracing::info!(channel, "Subscribed to confirmation channel");

		let mut messages = Box::pin(pubsub.on_message());
		loop {
			tokio::select! {
				message = messages.next() => {
					let Some(message) = message else {
						return Ok(false);
					};
					let payload: Vec<u8> = match message.get_payload() {
						Ok(payload) => payload,
						Err(e) => {
							tracing::warn!(error = %e, "Unreadable confirmation payload");
							continue;
						}
					};
					if let Some(request) = decode_confirmation(&payload) {
						tracing::debug!(order_id = request.order_id, "Confirmation received");
						if sender.send(request).is_err() {
							return Ok(true);
						}
					}
				}
				_ = stop_rx.changed() => return Ok(true),
			}
		}
	}
}

#[async_trait]
impl ConfirmationSourceInterface for RedisConfirmationSource {
	async fn start(
		&self,
		sender: mpsc::UnboundedSender<OrderConfirmRequest>,
	) -> Result<(), DiscoveryError> {
		let mut stop_signal = self.stop_signal.lock().await;
		if stop_signal.is_some() {
			return Err(DiscoveryError::AlreadyMonitoring);
		}
		let (stop_tx, mut stop_rx) = watch::channel(false);
		*stop_signal = Some(stop_tx);

		let client = self.client.clone();
		let channel = self.channel.clone();
		tokio::spawn(async move {
			loop {
				match Self::pump(&client, &channel, &sender, &mut stop_rx).await {
					Ok(true) => break,
					Ok(false) => tracing::warn!(channel = %channel, "Confirmation subscription closed"),
					Err(e) => tracing::error!(channel = %channel, error = %e, "Confirmation subscription failed"),
				}

				tokio::select! {
					_ = tokio::time::sleep(RECONNECT_DELAY) => {}
					_ = stop_rx.changed() => break,
				}
			}
			tracing::info!(channel = %channel, "Confirmation source stopped");
		});
		Ok(())
	}

	async fn stop(&self) -> Result<(), DiscoveryError> {
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(true);
		}
		Ok(())
	}
}

pub struct RedisConfirmationSourceSchema;

impl ConfigSchema for RedisConfirmationSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String)],
			vec![Field::new("channel", FieldType::String)],
		)
		.validate(config)
	}
}

/// Factory function to create a Redis confirmation source from configuration.
///
/// Configuration parameters:
/// - `url`: Redis connection URL
/// - `channel`: pub/sub channel name (default: "order.confirm")
pub fn create_source(
	config: &toml::Value,
) -> Result<Box<dyn ConfirmationSourceInterface>, DiscoveryError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DiscoveryError::Configuration("url is required".into()))?;
	let channel = config
		.get("channel")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_CHANNEL);

	Ok(Box::new(RedisConfirmationSource::new(url, channel)?))
}

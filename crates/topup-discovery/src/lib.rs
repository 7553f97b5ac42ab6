//! Payment confirmation intake.
//!
//! Besides the HTTP endpoint, payment confirmations arrive over a message
//! bus. Each configured source forwards decoded [`OrderConfirmRequest`]s into
//! a channel drained by the order engine.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use topup_types::OrderConfirmRequest;

/// Re-export implementations
pub mod implementations {
	pub mod channel;
	pub mod redis;
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Already monitoring")]
	AlreadyMonitoring,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for confirmation sources.
#[async_trait]
pub trait ConfirmationSourceInterface: Send + Sync {
	/// Starts forwarding confirmations to `sender` in the background.
	async fn start(
		&self,
		sender: mpsc::UnboundedSender<OrderConfirmRequest>,
	) -> Result<(), DiscoveryError>;

	async fn stop(&self) -> Result<(), DiscoveryError>;
}

/// Runs every configured confirmation source.
pub struct DiscoveryService {
	sources: Vec<Box<dyn ConfirmationSourceInterface>>,
}

impl DiscoveryService {
	pub fn new(sources: Vec<Box<dyn ConfirmationSourceInterface>>) -> Self {
		Self { sources }
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	pub async fn start_all(
		&self,
		sender: mpsc::UnboundedSender<OrderConfirmRequest>,
	) -> Result<(), DiscoveryError> {
		for source in &self.sources {
			source.start(sender.clone()).await?;
		}
		Ok(())
	}

	/// Stops every source, continuing past failures. Returns the first error.
	pub async fn stop_all(&self) -> Result<(), DiscoveryError> {
		let mut first_error = None;
		for source in &self.sources {
			if let Err(e) = source.stop().await {
				tracing::warn!(error = %e, "Failed to stop confirmation source");
				first_error.get_or_insert(e);
			}
		}
		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}

/// Decodes a bus payload, logging and dropping malformed messages.
pub(crate) fn decode_confirmation(payload: &[u8]) -> Option<OrderConfirmRequest> {
	match serde_json::from_slice(payload) {
		Ok(request) => Some(request),
		Err(e) => {
			tracing::warn!(error = %e, "Dropping malformed confirmation message");
			None
		}
	}
}

//! Notifications to the payment subsystem.
//!
//! The payment subsystem is told about every new pending order so it can
//! collect funds, and about every order that failed after payment so it can
//! reverse the charge. Both calls are made from detached tasks; their
//! outcome never affects the order.

use async_trait::async_trait;
use thiserror::Error;
use topup_types::{OrderId, OrderSnapshot, OrderStatus};

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod noop;
}

#[derive(Debug, Error)]
pub enum PaymentError {
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Payment service answered with status {0}")]
	Rejected(u16),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for payment notifiers.
#[async_trait]
pub trait PaymentInterface: Send + Sync {
	/// Announces a new pending order.
	async fn order_created(&self, order: &OrderSnapshot) -> Result<(), PaymentError>;

	/// Reports that an order ended in `status` after payment was captured.
	async fn order_failed(&self, order_id: OrderId, status: OrderStatus) -> Result<(), PaymentError>;
}

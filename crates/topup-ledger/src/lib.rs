//! Durable order ledger.
//!
//! The ledger holds exactly one [`LedgerRecord`] per order. It is written
//! when a payment confirmation is accepted and updated when a provider
//! reports the fulfillment outcome.

use async_trait::async_trait;
use thiserror::Error;
use topup_types::{LedgerRecord, OrderId, OrderStatus};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// A record already exists for the order.
	#[error("Duplicate record for order {0}")]
	Duplicate(OrderId),
	/// No record exists for the order.
	#[error("No record for order {0}")]
	NotFound(OrderId),
	/// Error that occurs in the ledger backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when a backend is misconfigured.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for ledger backends.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Inserts the record for a new order. Fails with
	/// [`LedgerError::Duplicate`] when one already exists.
	async fn create_record(&self, record: &LedgerRecord) -> Result<(), LedgerError>;

	/// Sets the status of an existing record and bumps its `updated_at`.
	async fn update_status_by_order_id(
		&self,
		order_id: OrderId,
		status: OrderStatus,
	) -> Result<(), LedgerError>;

	async fn find_by_order_id(&self, order_id: OrderId)
		-> Result<Option<LedgerRecord>, LedgerError>;
}

/// Service wrapping a ledger backend.
pub struct LedgerService {
	backend: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(backend: Box<dyn LedgerInterface>) -> Self {
		Self { backend }
	}

	pub async fn create_record(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
		self.backend.create_record(record).await?;
		tracing::info!(order_id = record.order_id, status = %record.status, "Ledger record created");
		Ok(())
	}

	pub async fn update_status(
		&self,
		order_id: OrderId,
		status: OrderStatus,
	) -> Result<(), LedgerError> {
		self.backend
			.update_status_by_order_id(order_id, status)
			.await?;
		tracing::info!(order_id, status = %status, "Ledger record updated");
		Ok(())
	}

	pub async fn find(&self, order_id: OrderId) -> Result<Option<LedgerRecord>, LedgerError> {
		self.backend.find_by_order_id(order_id).await
	}
}

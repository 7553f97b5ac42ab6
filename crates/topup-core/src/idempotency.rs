//! Idempotency guard for provider callbacks.
//!
//! The outcome of a processed callback is kept as an
//! [`IdempotencyVerdict`] keyed by order id. A repeated callback replays the
//! verdict instead of running again.

use std::time::Duration;
use topup_storage::{StorageError, StorageService};
use topup_types::{IdempotencyVerdict, OrderError, OrderId};

const NAMESPACE: &str = "idempotency";

pub struct IdempotencyGuard {
	storage: StorageService,
	ttl: Duration,
	record_infra_failures: bool,
}

impl IdempotencyGuard {
	pub fn new(storage: StorageService, ttl: Duration, record_infra_failures: bool) -> Self {
		Self {
			storage,
			ttl,
			record_infra_failures,
		}
	}

	/// Returns the recorded verdict for the order, if any.
	pub async fn lookup(&self, order_id: OrderId) -> Result<Option<IdempotencyVerdict>, StorageError> {
		match self.storage.retrieve(NAMESPACE, &order_id.to_string()).await {
			Ok(verdict) => Ok(Some(verdict)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Whether an outcome should be kept for replay.
	///
	/// Lock timeouts never are: the callback was not processed.
	pub fn should_record(&self, outcome: &Result<(), OrderError>) -> bool {
		match outcome {
			Ok(()) => true,
			Err(OrderError::LockTimeout(_)) => false,
			Err(OrderError::Infra(_)) => self.record_infra_failures,
			Err(_) => true,
		}
	}

	/// Records the outcome. Failing to record is logged, not returned: the
	/// work itself has already been done.
	pub async fn record(&self, order_id: OrderId, outcome: &Result<(), OrderError>) {
		if !self.should_record(outcome) {
			return;
		}

		let verdict = IdempotencyVerdict::from_result(outcome);
		if let Err(e) = self
			.storage
			.store_with_ttl(NAMESPACE, &order_id.to_string(), &verdict, Some(self.ttl))
			.await
		{
			tracing::warn!(order_id, error = %e, "Failed to record callback verdict");
		}
	}

	/// Drops verdicts whose time-to-live has run out.
	pub async fn purge_expired(&self) -> Result<usize, StorageError> {
		self.storage.purge_expired().await
	}
}

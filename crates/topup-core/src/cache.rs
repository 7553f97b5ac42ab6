//! Order state cache.
//!
//! Snapshots live under the `orders` namespace of a storage backend. They
//! are always read, mutated and written back whole.

use std::time::Duration;
use topup_storage::{StorageError, StorageService};
use topup_types::{OrderId, OrderSnapshot};

const NAMESPACE: &str = "orders";

pub struct OrderCache {
	storage: StorageService,
	ttl: Duration,
}

impl OrderCache {
	pub fn new(storage: StorageService, ttl: Duration) -> Self {
		Self { storage, ttl }
	}

	/// Returns the live snapshot, or [`StorageError::NotFound`] once it expired.
	pub async fn get(&self, order_id: OrderId) -> Result<OrderSnapshot, StorageError> {
		self.storage
			.retrieve(NAMESPACE, &order_id.to_string())
			.await
	}

	/// Writes the snapshot, restarting its time-to-live.
	pub async fn set(&self, snapshot: &OrderSnapshot) -> Result<(), StorageError> {
		self.storage
			.store_with_ttl(
				NAMESPACE,
				&snapshot.order_id.to_string(),
				snapshot,
				Some(self.ttl),
			)
			.await
	}

	/// Writes a brand new snapshot. Returns false if the id is already taken.
	pub async fn insert_new(&self, snapshot: &OrderSnapshot) -> Result<bool, StorageError> {
		self.storage
			.store_if_absent(
				NAMESPACE,
				&snapshot.order_id.to_string(),
				snapshot,
				Some(self.ttl),
			)
			.await
	}

	/// Drops snapshots whose time-to-live has run out.
	pub async fn purge_expired(&self) -> Result<usize, StorageError> {
		self.storage.purge_expired().await
	}
}

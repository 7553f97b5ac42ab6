//! Durable ledger row for an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderSnapshot, OrderStatus};

/// Audit-of-record row, written once the order leaves `Pending`.
///
/// Mirrors the snapshot fields so that a snapshot can be rebuilt from the
/// ledger when the cache entry has expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
	pub order_id: OrderId,
	pub user_id: u64,
	pub sku_id: u64,
	pub supplier_code: String,
	pub phone_number: String,
	pub price: i64,
	pub total_price: i64,
	pub cash_back_value: i64,
	pub status: OrderStatus,
	pub random_provider_weight: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
	/// Builds the first ledger row for a snapshot moving to `status`.
	pub fn from_snapshot(snapshot: &OrderSnapshot, status: OrderStatus) -> Self {
		let now = Utc::now();
		Self {
			order_id: snapshot.order_id,
			user_id: snapshot.user_id,
			sku_id: snapshot.sku_id,
			supplier_code: snapshot.supplier_code.clone(),
			phone_number: snapshot.phone_number.clone(),
			price: snapshot.price,
			total_price: snapshot.total_price,
			cash_back_value: snapshot.cash_back_value,
			status,
			random_provider_weight: snapshot.random_provider_weight,
			created_at: now,
			updated_at: now,
		}
	}

	/// Rebuilds the live snapshot this record was written from.
	pub fn to_snapshot(&self) -> OrderSnapshot {
		OrderSnapshot {
			order_id: self.order_id,
			user_id: self.user_id,
			sku_id: self.sku_id,
			supplier_code: self.supplier_code.clone(),
			phone_number: self.phone_number.clone(),
			price: self.price,
			total_price: self.total_price,
			cash_back_value: self.cash_back_value,
			status: self.status,
			random_provider_weight: self.random_provider_weight,
			created_at: self.created_at,
		}
	}
}

//! Order lifecycle types.
//!
//! This module defines the cache-resident order snapshot, the request
//! payloads that move an order through its lifecycle and the payload sent
//! to fulfillment providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an order.
pub type OrderId = u64;

/// Lifecycle status of an order.
///
/// `Pending` is the only initial state. `Settled` and `Rejected` are
/// terminal. The serialized names are the ones used on the wire by the
/// payment subsystem and the fulfillment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Created, waiting for the payment subsystem to confirm funds.
	#[serde(rename = "pending")]
	Pending,
	/// Payment captured, fulfillment dispatched to a provider.
	#[serde(rename = "confirm")]
	Confirmed,
	/// The provider delivered the product.
	#[serde(rename = "success")]
	Settled,
	/// Payment or fulfillment failed.
	#[serde(rename = "failed")]
	Rejected,
}

impl OrderStatus {
	/// Returns true when no further transition may leave this status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Settled | OrderStatus::Rejected)
	}

	/// Returns true when `next` is a legal transition from this status.
	pub fn can_transition_to(&self, next: OrderStatus) -> bool {
		matches!(
			(self, next),
			(OrderStatus::Pending, OrderStatus::Confirmed)
				| (OrderStatus::Pending, OrderStatus::Rejected)
				| (OrderStatus::Confirmed, OrderStatus::Settled)
				| (OrderStatus::Confirmed, OrderStatus::Rejected)
		)
	}

	/// Wire name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Confirmed => "confirm",
			OrderStatus::Settled => "success",
			OrderStatus::Rejected => "failed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Cache-resident representation of one order.
///
/// The snapshot is authoritative while the order is live. It is read,
/// mutated and written back as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
	pub order_id: OrderId,
	pub user_id: u64,
	pub sku_id: u64,
	/// Supplier the product belongs to, selects the provider pool.
	pub supplier_code: String,
	pub phone_number: String,
	/// Unit price of the product.
	pub price: i64,
	pub total_price: i64,
	pub cash_back_value: i64,
	pub status: OrderStatus,
	/// Provider-selection draw pinned at creation. Never recomputed.
	pub random_provider_weight: u32,
	pub created_at: DateTime<Utc>,
}

impl OrderSnapshot {
	/// Compares the immutable fields of a confirmation against this snapshot.
	pub fn matches_confirmation(&self, request: &OrderConfirmRequest) -> bool {
		self.order_id == request.order_id
			&& self.user_id == request.user_id
			&& self.total_price == request.total_price
			&& self.phone_number == request.phone_number
			&& self.cash_back_value == request.cash_back_value
	}
}

/// Request from a buyer to purchase a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
	pub user_id: u64,
	pub sku_id: u64,
	pub phone_number: String,
}

/// Order as returned to the buyer and announced to the payment subsystem.
///
/// The provider-selection draw is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
	pub order_id: OrderId,
	pub user_id: u64,
	pub sku_id: u64,
	pub phone_number: String,
	pub total_price: i64,
	pub cash_back_value: i64,
	pub status: OrderStatus,
}

impl From<&OrderSnapshot> for OrderResponse {
	fn from(snapshot: &OrderSnapshot) -> Self {
		Self {
			order_id: snapshot.order_id,
			user_id: snapshot.user_id,
			sku_id: snapshot.sku_id,
			phone_number: snapshot.phone_number.clone(),
			total_price: snapshot.total_price,
			cash_back_value: snapshot.cash_back_value,
			status: snapshot.status,
		}
	}
}

/// Payment confirmation, delivered over HTTP or the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmRequest {
	pub order_id: OrderId,
	pub user_id: u64,
	#[serde(default)]
	pub sku_id: u64,
	pub total_price: i64,
	pub status: OrderStatus,
	pub phone_number: String,
	pub cash_back_value: i64,
}

/// Fulfillment outcome reported by a provider through its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdateRequest {
	pub order_id: OrderId,
	pub status: OrderStatus,
	#[serde(default)]
	pub phone_number: String,
}

/// Fulfillment request sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrderRequest {
	pub order_id: OrderId,
	pub phone_number: String,
	pub total_price: i64,
	pub price: i64,
	pub callback_url: String,
}

impl ProviderOrderRequest {
	pub fn from_snapshot(snapshot: &OrderSnapshot, callback_url: &str) -> Self {
		Self {
			order_id: snapshot.order_id,
			phone_number: snapshot.phone_number.clone(),
			total_price: snapshot.total_price,
			price: snapshot.price,
			callback_url: callback_url.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn snapshot() -> OrderSnapshot {
		OrderSnapshot {
			order_id: 1001,
			user_id: 1,
			sku_id: 1,
			supplier_code: "VTL".to_string(),
			phone_number: "081234567890".to_string(),
			price: 10000,
			total_price: 10000,
			cash_back_value: 500,
			status: OrderStatus::Pending,
			random_provider_weight: 50,
			created_at: Utc::now(),
		}
	}

	fn confirmation() -> OrderConfirmRequest {
		OrderConfirmRequest {
			order_id: 1001,
			user_id: 1,
			sku_id: 1,
			total_price: 10000,
			status: OrderStatus::Confirmed,
			phone_number: "081234567890".to_string(),
			cash_back_value: 500,
		}
	}

	#[test]
	fn test_status_wire_names() {
		let json = serde_json::to_string(&OrderStatus::Confirmed).unwrap();
		assert_eq!(json, "\"confirm\"");

		let status: OrderStatus = serde_json::from_str("\"failed\"").unwrap();
		assert_eq!(status, OrderStatus::Rejected);
		assert_eq!(OrderStatus::Settled.to_string(), "success");
	}

	#[test]
	fn test_transitions() {
		assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
		assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Rejected));
		assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Settled));
		assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Settled));
		assert!(!OrderStatus::Settled.can_transition_to(OrderStatus::Rejected));
		assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
		assert!(OrderStatus::Rejected.is_terminal());
		assert!(!OrderStatus::Confirmed.is_terminal());
	}

	#[test]
	fn test_matches_confirmation() {
		let snapshot = snapshot();
		assert!(snapshot.matches_confirmation(&confirmation()));

		let mut request = confirmation();
		request.cash_back_value = 1000;
		assert!(!snapshot.matches_confirmation(&request));

		let mut request = confirmation();
		request.phone_number = "089999999999".to_string();
		assert!(!snapshot.matches_confirmation(&request));

		// sku and status are not part of the comparison
		let mut request = confirmation();
		request.sku_id = 42;
		request.status = OrderStatus::Rejected;
		assert!(snapshot.matches_confirmation(&request));
	}

	#[test]
	fn test_response_hides_selection_draw() {
		let response = OrderResponse::from(&snapshot());
		let json = serde_json::to_value(&response).unwrap();
		assert!(json.get("random_provider_weight").is_none());
		assert_eq!(json["status"], "pending");
		assert_eq!(json["cash_back_value"], 500);
	}
}

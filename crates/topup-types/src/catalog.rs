//! Catalog types: purchasable products and fulfillment providers.

use serde::{Deserialize, Serialize};

/// Cashback rule attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CashBackRule {
	/// Percentage of the product price, truncated to an integer amount.
	Percentage { value: i64 },
	/// Fixed amount regardless of price.
	Fixed { value: i64 },
}

impl CashBackRule {
	/// Computes the cashback owed for the given price, or `None` when a
	/// percentage of that price does not fit in an `i64`.
	pub fn compute(&self, price: i64) -> Option<i64> {
		match self {
			CashBackRule::Percentage { value } => price.checked_mul(*value).map(|v| v / 100),
			CashBackRule::Fixed { value } => Some(*value),
		}
	}
}

/// A purchasable top-up or voucher product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
	pub id: u64,
	#[serde(default)]
	pub name: String,
	pub price: i64,
	pub supplier_code: String,
	pub cash_back: CashBackRule,
}

/// A fulfillment partner and the suppliers it can fulfill for.
///
/// `provider_type` is kept as the raw catalog string; it is resolved to a
/// supported protocol when the provider router is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
	pub code: String,
	#[serde(default)]
	pub name: String,
	#[serde(rename = "type")]
	pub provider_type: String,
	pub address: String,
	pub weight: u32,
	pub suppliers: Vec<String>,
}

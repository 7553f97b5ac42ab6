//! Product and provider catalog.
//!
//! The order engine reads products when pricing an order; the provider
//! router reads the provider list once at startup.

use async_trait::async_trait;
use thiserror::Error;
use topup_types::{Product, Provider};

/// Re-export implementations
pub mod implementations {
	pub mod static_catalog;
}

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("Product {0} not found")]
	ProductNotFound(u64),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for catalog backends.
#[async_trait]
pub trait CatalogInterface: Send + Sync {
	async fn get_product_by_id(&self, id: u64) -> Result<Product, CatalogError>;

	/// Returns every provider together with the supplier codes it serves,
	/// in declaration order.
	async fn get_providers_with_suppliers(&self) -> Result<Vec<Provider>, CatalogError>;
}

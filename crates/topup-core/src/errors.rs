//! Mapping of collaborator errors onto the order error taxonomy.

use topup_catalog::CatalogError;
use topup_delivery::DeliveryError;
use topup_ledger::LedgerError;
use topup_lock::LockError;
use topup_storage::StorageError;
use topup_types::OrderError;

pub(crate) const ORDER_NOT_FOUND: &str = "order not found or expired";
pub(crate) const SKU_NOT_FOUND: &str = "sku not found";
pub(crate) const ORDER_MISMATCH: &str = "order mismatch";
pub(crate) const ORDER_PENDING: &str = "order is pending";
pub(crate) const ORDER_ALREADY_PROCESSED: &str = "order already confirmed or failed";
pub(crate) const ORDER_NOT_CONFIRMED: &str = "order is not confirmed or failed";
pub(crate) const SETTLE_BEFORE_CONFIRM: &str = "order cannot settle before it is confirmed";
pub(crate) const UNSUPPORTED_UPDATE_STATUS: &str = "update status must be success or failed";

pub(crate) fn from_storage(e: StorageError) -> OrderError {
	match e {
		StorageError::NotFound => OrderError::NotFound(ORDER_NOT_FOUND.to_string()),
		other => OrderError::Infra(format!("order cache: {}", other)),
	}
}

pub(crate) fn from_lock(e: LockError) -> OrderError {
	match e {
		LockError::Timeout(key) => OrderError::LockTimeout(format!("timed out waiting for {}", key)),
		other => OrderError::Infra(format!("order lock: {}", other)),
	}
}

pub(crate) fn from_ledger(e: LedgerError) -> OrderError {
	match e {
		LedgerError::Duplicate(_) => OrderError::InvalidTransition(ORDER_ALREADY_PROCESSED.to_string()),
		other => OrderError::Infra(format!("ledger: {}", other)),
	}
}

pub(crate) fn from_catalog(e: CatalogError) -> OrderError {
	match e {
		CatalogError::ProductNotFound(_) => OrderError::NotFound(SKU_NOT_FOUND.to_string()),
		other => OrderError::Infra(format!("catalog: {}", other)),
	}
}

pub(crate) fn from_delivery(e: DeliveryError) -> OrderError {
	match e {
		DeliveryError::NoProviderAvailable(supplier) => OrderError::NoProviderAvailable(supplier),
		DeliveryError::UnsupportedProviderType { provider_type, .. } => {
			OrderError::UnsupportedProviderType(provider_type)
		}
		other => OrderError::Infra(format!("delivery: {}", other)),
	}
}

//! Error taxonomy of the order engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the order lifecycle operations.
///
/// Every variant carries a human readable message so that a recorded
/// verdict can reproduce the exact same error later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
	/// Product missing, or cached order missing or expired.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Confirmation fields do not match the cached order.
	#[error("Validation mismatch: {0}")]
	ValidationMismatch(String),
	/// The order is in the wrong state for the requested operation.
	#[error("Invalid transition: {0}")]
	InvalidTransition(String),
	/// The per-order lock was not obtained in time.
	#[error("Lock timeout: {0}")]
	LockTimeout(String),
	/// No provider serves the order's supplier.
	#[error("No provider available: {0}")]
	NoProviderAvailable(String),
	/// A provider is configured with a protocol the router cannot speak.
	#[error("Unsupported provider type: {0}")]
	UnsupportedProviderType(String),
	/// Cache, store or network failure.
	#[error("Infrastructure error: {0}")]
	Infra(String),
}

/// Serializable discriminant of [`OrderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	NotFound,
	ValidationMismatch,
	InvalidTransition,
	LockTimeout,
	NoProviderAvailable,
	UnsupportedProviderType,
	Infra,
}

impl OrderError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			OrderError::NotFound(_) => ErrorKind::NotFound,
			OrderError::ValidationMismatch(_) => ErrorKind::ValidationMismatch,
			OrderError::InvalidTransition(_) => ErrorKind::InvalidTransition,
			OrderError::LockTimeout(_) => ErrorKind::LockTimeout,
			OrderError::NoProviderAvailable(_) => ErrorKind::NoProviderAvailable,
			OrderError::UnsupportedProviderType(_) => ErrorKind::UnsupportedProviderType,
			OrderError::Infra(_) => ErrorKind::Infra,
		}
	}

	/// The message carried by the error, without the kind prefix.
	pub fn message(&self) -> &str {
		match self {
			OrderError::NotFound(m)
			| OrderError::ValidationMismatch(m)
			| OrderError::InvalidTransition(m)
			| OrderError::LockTimeout(m)
			| OrderError::NoProviderAvailable(m)
			| OrderError::UnsupportedProviderType(m)
			| OrderError::Infra(m) => m,
		}
	}

	/// Rebuilds an error from its kind and message.
	pub fn from_parts(kind: ErrorKind, message: impl Into<String>) -> Self {
		let message = message.into();
		match kind {
			ErrorKind::NotFound => OrderError::NotFound(message),
			ErrorKind::ValidationMismatch => OrderError::ValidationMismatch(message),
			ErrorKind::InvalidTransition => OrderError::InvalidTransition(message),
			ErrorKind::LockTimeout => OrderError::LockTimeout(message),
			ErrorKind::NoProviderAvailable => OrderError::NoProviderAvailable(message),
			ErrorKind::UnsupportedProviderType => OrderError::UnsupportedProviderType(message),
			ErrorKind::Infra => OrderError::Infra(message),
		}
	}
}

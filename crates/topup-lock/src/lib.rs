//! Distributed lock for the top-up order broker.
//!
//! A lock is held through a [`Lease`]: a key plus a random token. Leases
//! expire on their own after a short duration so a crashed holder cannot
//! wedge an order. Contended acquirers wait for a release notification
//! instead of polling, and give up with [`LockError::Timeout`] once their
//! deadline passes. Dropping an acquire future abandons the wait.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod redis;
}

/// Default lifetime of a lease when the backend config does not set one.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Errors that can occur while acquiring or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
	/// The deadline passed before the lock could be obtained.
	#[error("Timed out waiting for lock {0}")]
	Timeout(String),
	/// Error that occurs in the lock backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when a backend is misconfigured.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Proof of lock ownership returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
	pub key: String,
	/// Random value identifying this holder; release only succeeds while it
	/// still matches.
	pub token: String,
}

impl Lease {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			token: uuid::Uuid::new_v4().to_string(),
		}
	}
}

/// Trait defining the interface for lock backends.
#[async_trait]
pub trait LockInterface: Send + Sync {
	/// Acquires the lock on `key`, waiting at most `timeout`.
	async fn try_acquire(&self, key: &str, timeout: Duration) -> Result<Lease, LockError>;

	/// Releases a lease and wakes waiters on its key.
	///
	/// Releasing a lease that already expired, or whose key was taken over by
	/// another holder, is a no-op.
	async fn release(&self, lease: &Lease) -> Result<(), LockError>;
}

/// Service wrapping a lock backend.
pub struct LockService {
	backend: Box<dyn LockInterface>,
}

impl LockService {
	pub fn new(backend: Box<dyn LockInterface>) -> Self {
		Self { backend }
	}

	pub async fn acquire(&self, key: &str, timeout: Duration) -> Result<Lease, LockError> {
		let lease = self.backend.try_acquire(key, timeout).await?;
		tracing::debug!(key, "Lock acquired");
		Ok(lease)
	}

	/// Releases a lease, logging instead of failing when the backend errors.
	///
	/// The lease expires on its own, so a failed release only delays the next
	/// holder.
	pub async fn release(&self, lease: &Lease) {
		match self.backend.release(lease).await {
			Ok(()) => tracing::debug!(key = %lease.key, "Lock released"),
			Err(e) => tracing::warn!(key = %lease.key, error = %e, "Failed to release lock"),
		}
	}
}

/// Reads `lease_secs` from a backend table, falling back to [`DEFAULT_LEASE`].
pub(crate) fn lease_from_config(config: &toml::Value) -> Duration {
	config
		.get("lease_secs")
		.and_then(|v| v.as_integer())
		.filter(|secs| *secs > 0)
		.map(|secs| Duration::from_secs(secs as u64))
		.unwrap_or(DEFAULT_LEASE)
}

//! In-process lock backend.
//!
//! Leases live in a concurrent map; each contended key gets a broadcast
//! channel on which releases are announced.

use crate::{lease_from_config, Lease, LockError, LockInterface};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Instant};
use topup_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

struct Held {
	token: String,
	expires_at: Instant,
}

pub struct MemoryLock {
	held: DashMap<String, Held>,
	releases: DashMap<String, broadcast::Sender<()>>,
	lease: Duration,
}

impl MemoryLock {
	pub fn new(lease: Duration) -> Self {
		Self {
			held: DashMap::new(),
			releases: DashMap::new(),
			lease,
		}
	}

	fn subscribe(&self, key: &str) -> broadcast::Receiver<()> {
		self.releases
			.entry(key.to_string())
			.or_insert_with(|| broadcast::channel(8).0)
			.subscribe()
	}

	/// Takes the lock if it is free or its lease has run out. On contention
	/// returns the current holder's expiry.
	fn try_set(&self, lease: &Lease) -> Result<(), Instant> {
		let now = Instant::now();
		let fresh = Held {
			token: lease.token.clone(),
			expires_at: now + self.lease,
		};

		match self.held.entry(lease.key.clone()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().expires_at <= now {
					occupied.insert(fresh);
					Ok(())
				} else {
					Err(occupied.get().expires_at)
				}
			}
			Entry::Vacant(vacant) => {
				vacant.insert(fresh);
				Ok(())
			}
		}
	}
}

#[async_trait]
impl LockInterface for MemoryLock {
	async fn try_acquire(&self, key: &str, timeout: Duration) -> Result<Lease, LockError> {
		let deadline = Instant::now() + timeout;
		let lease = Lease::new(key);

		loop {
			// Subscribe before trying so a release in between is not missed
			let mut released = self.subscribe(key);

			let holder_expiry = match self.try_set(&lease) {
				Ok(()) => return Ok(lease),
				Err(expiry) => expiry,
			};
			if Instant::now() >= deadline {
				return Err(LockError::Timeout(key.to_string()));
			}

			tokio::select! {
				_ = released.recv() => {}
				_ = sleep_until(holder_expiry.min(deadline)) => {}
			}
		}
	}

	async fn release(&self, lease: &Lease) -> Result<(), LockError> {
		let removed = self
			.held
			.remove_if(&lease.key, |_, held| held.token == lease.token)
			.is_some();

		if removed {
			if let Some(sender) = self.releases.get(&lease.key) {
				let _ = sender.send(());
			}
			self.releases
				.remove_if(&lease.key, |_, sender| sender.receiver_count() == 0);
		}
		Ok(())
	}
}

/// Configuration schema for MemoryLock.
pub struct MemoryLockSchema;

impl ConfigSchema for MemoryLockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new(
				"lease_secs",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

/// Factory function to create an in-process lock from configuration.
///
/// Configuration parameters:
/// - `lease_secs`: lifetime of a lease (default: 30)
pub fn create_lock(config: &toml::Value) -> Result<Box<dyn LockInterface>, LockError> {
	Ok(Box::new(MemoryLock::new(lease_from_config(config))))
}

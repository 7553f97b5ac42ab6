//! In-memory storage backend.
//!
//! Entries carry their own deadline. An expired entry reads as absent right
//! away and is dropped on its next access or by the next
//! [`StorageInterface::purge_expired`] sweep.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;
use topup_types::{ConfigSchema, Schema, ValidationError};

struct StoredValue {
	bytes: Vec<u8>,
	expires_at: Option<Instant>,
}

impl StoredValue {
	fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			bytes,
			expires_at: ttl.map(|ttl| Instant::now() + ttl),
		}
	}

	fn is_expired(&self) -> bool {
		self.expires_at
			.map(|deadline| deadline <= Instant::now())
			.unwrap_or(false)
	}
}

/// Process-local storage, suitable for a single instance and for tests.
#[derive(Default)]
pub struct MemoryStorage {
	data: DashMap<String, StoredValue>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of resident entries, expired or not.
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let expired = match self.data.get(key) {
			Some(entry) if !entry.is_expired() => return Ok(entry.bytes.clone()),
			Some(_) => true,
			None => false,
		};

		if expired {
			self.data.remove_if(key, |_, v| v.is_expired());
		}
		Err(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.data
			.insert(key.to_string(), StoredValue::new(value, ttl));
		Ok(())
	}

	async fn set_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		match self.data.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().is_expired() {
					occupied.insert(StoredValue::new(value, ttl));
					Ok(true)
				} else {
					Ok(false)
				}
			}
			Entry::Vacant(vacant) => {
				vacant.insert(StoredValue::new(value, ttl));
				Ok(true)
			}
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self
			.data
			.get(key)
			.map(|entry| !entry.is_expired())
			.unwrap_or(false))
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		self.data.retain(|_, value| {
			let live = !value.is_expired();
			if !live {
				removed += 1;
			}
			live
		});
		Ok(removed)
	}
}

/// Configuration schema for MemoryStorage. It takes no settings.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

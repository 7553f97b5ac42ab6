//! Redis storage backend.
//!
//! Shares one multiplexed connection across all callers. The connection is
//! opened on first use so the factory stays synchronous.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use topup_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

pub struct RedisStorage {
	client: Client,
	conn: OnceCell<ConnectionManager>,
}

impl RedisStorage {
	pub fn new(redis_url: &str) -> Result<Self, StorageError> {
		let client = Client::open(redis_url)
			.map_err(|e| StorageError::Configuration(format!("Invalid Redis URL: {e}")))?;
		Ok(Self {
			client,
			conn: OnceCell::new(),
		})
	}

	async fn connection(&self) -> Result<ConnectionManager, StorageError> {
		let conn = self
			.conn
			.get_or_try_init(|| ConnectionManager::new(self.client.clone()))
			.await
			.map_err(backend)?;
		Ok(conn.clone())
	}
}

fn backend(e: redis::RedisError) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
	(ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl StorageInterface for RedisStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let mut conn = self.connection().await?;
		let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend)?;
		value.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut conn = self.connection().await?;
		let _: () = match ttl {
			Some(ttl) => conn.pset_ex(key, value, ttl_millis(ttl)).await,
			None => conn.set(key, value).await,
		}
		.map_err(backend)?;
		Ok(())
	}

	async fn set_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut conn = self.connection().await?;
		let mut cmd = redis::cmd("SET");
		cmd.arg(key).arg(value).arg("NX");
		if let Some(ttl) = ttl {
			cmd.arg("PX").arg(ttl_millis(ttl));
		}

		// SET NX replies OK when written and nil otherwise
		let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(backend)?;
		Ok(reply.is_some())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut conn = self.connection().await?;
		let _: () = conn.del(key).await.map_err(backend)?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let mut conn = self.connection().await?;
		conn.exists(key).await.map_err(backend)
	}
}

/// Configuration schema for RedisStorage.
pub struct RedisStorageSchema;

impl ConfigSchema for RedisStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => Ok(()),
					_ => Err("url must start with redis:// or rediss://".to_string()),
				}
			})],
			vec![],
		)
		.validate(config)
	}
}

/// Factory function to create a Redis storage backend from configuration.
///
/// Configuration parameters:
/// - `url`: Redis connection URL, e.g. `redis://127.0.0.1:6379`
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("url is required".into()))?;

	Ok(Box::new(RedisStorage::new(url)?))
}

//! Redis lock backend.
//!
//! The lock on `key` is the string `lock:<key>` holding the lease token,
//! written with `SET NX PX`. Releases are announced on the pub/sub channel
//! `lock:<key>:release`.

use crate::{lease_from_config, Lease, LockError, LockInterface};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{sleep_until, Instant};
use topup_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
	redis.call('DEL', KEYS[1])
	redis.call('PUBLISH', KEYS[2], 'released')
	return 1
end
return 0
"#;

pub struct RedisLock {
	client: Client,
	conn: OnceCell<ConnectionManager>,
	release_script: Script,
	lease: Duration,
}

fn backend(e: redis::RedisError) -> LockError {
	LockError::Backend(e.to_string())
}

fn lock_key(key: &str) -> String {
	format!("lock:{}", key)
}

fn release_channel(key: &str) -> String {
	format!("lock:{}:release", key)
}

impl RedisLock {
	pub fn new(redis_url: &str, lease: Duration) -> Result<Self, LockError> {
		let client = Client::open(redis_url)
			.map_err(|e| LockError::Configuration(format!("Invalid Redis URL: {e}")))?;
		Ok(Self {
			client,
			conn: OnceCell::new(),
			release_script: Script::new(RELEASE_SCRIPT),
			lease,
		})
	}

	async fn connection(&self) -> Result<ConnectionManager, LockError> {
		let conn = self
			.conn
			.get_or_try_init(|| ConnectionManager::new(self.client.clone()))
			.await
			.map_err(backend)?;
		Ok(conn.clone())
	}

	async fn try_set(&self, conn: &mut ConnectionManager, lease: &Lease) -> Result<bool, LockError> {
		let reply: Option<String> = redis::cmd("SET")
			.arg(lock_key(&lease.key))
			.arg(&lease.token)
			.arg("NX")
			.arg("PX")
			.arg(self.lease.as_millis() as u64)
			.query_async(conn)
			.await
			.map_err(backend)?;
		Ok(reply.is_some())
	}

	/// When the current holder's lease runs out, capped at `deadline`.
	async fn holder_expiry(
		&self,
		conn: &mut ConnectionManager,
		key: &str,
		deadline: Instant,
	) -> Result<Instant, LockError> {
		let pttl: i64 = conn.pttl(lock_key(key)).await.map_err(backend)?;
		let expiry = match pttl {
			// key vanished between SET and PTTL, retry right away
			-2 => Instant::now(),
			ms if ms > 0 => Instant::now() + Duration::from_millis(ms as u64),
			_ => deadline,
		};
		Ok(expiry.min(deadline))
	}
}

#[async_trait]
impl LockInterface for RedisLock {
	async fn try_acquire(&self, key: &str, timeout: Duration) -> Result<Lease, LockError> {
		let deadline = Instant::now() + timeout;
		let lease = Lease::new(key);
		let mut conn = self.connection().await?;

		if self.try_set(&mut conn, &lease).await? {
			return Ok(lease);
		}

		let mut pubsub = self.client.get_async_pubsub().await.map_err(backend)?;
		pubsub
			.subscribe(release_channel(key))
			.await
			.map_err(backend)?;
		let mut releases = Box::pin(pubsub.on_message());

		loop {
			if self.try_set(&mut conn, &lease).await? {
				return Ok(lease);
			}
			if Instant::now() >= deadline {
				return Err(LockError::Timeout(key.to_string()));
			}

			let wake_at = self.holder_expiry(&mut conn, key, deadline).await?;
			tokio::select! {
				message = releases.next() => {
					if message.is_none() {
						return Err(LockError::Backend("release subscription closed".into()));
					}
				}
				_ = sleep_until(wake_at) => {}
			}
		}
	}

	async fn release(&self, lease: &Lease) -> Result<(), LockError> {
		let mut conn = self.connection().await?;
		let released: i32 = self
			.release_script
			.key(lock_key(&lease.key))
			.key(release_channel(&lease.key))
			.arg(&lease.token)
			.invoke_async(&mut conn)
			.await
			.map_err(backend)?;

		if released == 0 {
			tracing::debug!(key = %lease.key, "Lease already expired or taken over");
		}
		Ok(())
	}
}

/// Configuration schema for RedisLock.
pub struct RedisLockSchema;

impl ConfigSchema for RedisLockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String)],
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

/// Factory function to create a Redis lock from configuration.
///
/// Configuration parameters:
/// - `url`: Redis connection URL
/// - `lease_secs`: lifetime of a lease (default: 30)
pub fn create_lock(config: &toml::Value) -> Result<Box<dyn LockInterface>, LockError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LockError::Configuration("url is required".into()))?;

	Ok(Box::new(RedisLock::new(url, lease_from_config(config))?))
}

//! File-based storage backend.
//!
//! Each key is stored as one file. The first eight bytes hold the expiry as
//! big-endian unix milliseconds (zero when the entry never expires), the
//! rest is the value.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use topup_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

const HEADER_LEN: usize = 8;

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

fn encode(value: Vec<u8>, ttl: Option<Duration>) -> Vec<u8> {
	let expires_at = ttl
		.map(|ttl| now_millis().saturating_add(ttl.as_millis() as u64))
		.unwrap_or(0);
	let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
	bytes.extend_from_slice(&expires_at.to_be_bytes());
	bytes.extend_from_slice(&value);
	bytes
}

/// Splits a stored file into its value, or `None` when the entry has expired.
fn decode(mut bytes: Vec<u8>) -> Result<Option<Vec<u8>>, StorageError> {
	if bytes.len() < HEADER_LEN {
		return Err(StorageError::Backend("truncated storage file".into()));
	}
	let mut header = [0u8; HEADER_LEN];
	header.copy_from_slice(&bytes[..HEADER_LEN]);
	let expires_at = u64::from_be_bytes(header);

	if expires_at != 0 && expires_at <= now_millis() {
		return Ok(None);
	}
	Ok(Some(bytes.split_off(HEADER_LEN)))
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	async fn ensure_base_dir(&self) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn read_live(&self, path: &PathBuf) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(data) => decode(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		match self.read_live(&path).await? {
			Some(value) => Ok(value),
			None => {
				if fs::remove_file(&path).await.is_ok() {
					tracing::debug!(key, "Evicted expired entry");
				}
				Err(StorageError::NotFound)
			}
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.ensure_base_dir().await?;
		let path = self.get_file_path(key);

		// Write to a temp file then rename so readers never see a partial value
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, encode(value, ttl))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn set_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		self.ensure_base_dir().await?;
		let path = self.get_file_path(key);

		if fs::try_exists(&path).await.unwrap_or(false) && self.read_live(&path).await?.is_none() {
			let _ = fs::remove_file(&path).await;
		}

		let mut file = match fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&path)
			.await
		{
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		file.write_all(&encode(value, ttl))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.flush()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		Ok(self.read_live(&path).await?.is_some())
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
				continue;
			}
			// Unreadable files are left for the next sweep
			if let Ok(None) = self.read_live(&path).await {
				if fs::remove_file(&path).await.is_ok() {
					removed += 1;
				}
			}
		}

		if removed > 0 {
			tracing::debug!(removed, "Purged expired storage files");
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

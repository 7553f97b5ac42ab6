//! Append-only file ledger.
//!
//! Every write appends the full record as one JSON line. On first use the
//! log is replayed and the last line per order wins. An unparseable final
//! line is treated as a torn write and cut off; corruption anywhere else
//! fails the replay.

use crate::{LedgerError, LedgerInterface};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};
use topup_types::{
	ConfigSchema, Field, FieldType, LedgerRecord, OrderId, OrderStatus, Schema, ValidationError,
};

pub struct FileLedger {
	path: PathBuf,
	records: OnceCell<Mutex<HashMap<OrderId, LedgerRecord>>>,
}

fn backend(e: impl std::fmt::Display) -> LedgerError {
	LedgerError::Backend(e.to_string())
}

impl FileLedger {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			records: OnceCell::new(),
		}
	}

	async fn replay(&self) -> Result<Mutex<HashMap<OrderId, LedgerRecord>>, LedgerError> {
		let contents = match fs::read(&self.path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
			Err(e) => return Err(backend(e)),
		};

		let mut records = HashMap::new();
		let mut offset = 0;
		let mut lines = contents.split_inclusive(|b| *b == b'\n').enumerate().peekable();
		while let Some((line_no, line)) = lines.next() {
			let start = offset;
			offset += line.len();
			if line.iter().all(u8::is_ascii_whitespace) {
				continue;
			}

			let last = lines.peek().is_none();
			match serde_json::from_slice::<LedgerRecord>(line) {
				Ok(record) => {
					records.insert(record.order_id, record);
				}
				// A crash mid-append leaves a torn final line; cut it off so
				// later appends start on a clean line
				Err(e) if last => {
					tracing::warn!(
						path = %self.path.display(),
						line = line_no + 1,
						error = %e,
						"Truncating torn final ledger line"
					);
					self.truncate(start as u64).await?;
				}
				Err(e) => return Err(backend(format!("line {}: {}", line_no + 1, e))),
			}
		}

		tracing::info!(path = %self.path.display(), records = records.len(), "Ledger replayed");
		Ok(Mutex::new(records))
	}

	async fn truncate(&self, len: u64) -> Result<(), LedgerError> {
		let file = fs::OpenOptions::new()
			.write(true)
			.open(&self.path)
			.await
			.map_err(backend)?;
		file.set_len(len).await.map_err(backend)
	}

	async fn records(&self) -> Result<&Mutex<HashMap<OrderId, LedgerRecord>>, LedgerError> {
		self.records.get_or_try_init(|| self.replay()).await
	}

	async fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await.map_err(backend)?;
		}

		let mut line = serde_json::to_vec(record).map_err(backend)?;
		line.push(b'\n');

		let mut file = fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await
			.map_err(backend)?;
		file.write_all(&line).await.map_err(backend)?;
		file.flush().await.map_err(backend)
	}
}

#[async_trait]
impl LedgerInterface for FileLedger {
	async fn create_record(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
		let mut records = self.records().await?.lock().await;
		if records.contains_key(&record.order_id) {
			return Err(LedgerError::Duplicate(record.order_id));
		}

		self.append(record).await?;
		records.insert(record.order_id, record.clone());
		Ok(())
	}

	async fn update_status_by_order_id(
		&self,
		order_id: OrderId,
		status: OrderStatus,
	) -> Result<(), LedgerError> {
		let mut records = self.records().await?.lock().await;
		let mut updated = records
			.get(&order_id)
			.cloned()
			.ok_or(LedgerError::NotFound(order_id))?;
		updated.status = status;
		updated.updated_at = Utc::now();

		self.append(&updated).await?;
		records.insert(order_id, updated);
		Ok(())
	}

	async fn find_by_order_id(
		&self,
		order_id: OrderId,
	) -> Result<Option<LedgerRecord>, LedgerError> {
		let records = self.records().await?.lock().await;
		Ok(records.get(&order_id).cloned())
	}
}

pub struct FileLedgerSchema;

impl ConfigSchema for FileLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("path", FieldType::String)]).validate(config)
	}
}

/// Factory function to create a file ledger from configuration.
///
/// Configuration parameters:
/// - `path`: JSON-lines log file (default: "./data/ledger.jsonl")
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/ledger.jsonl");

	Ok(Box::new(FileLedger::new(PathBuf::from(path))))
}

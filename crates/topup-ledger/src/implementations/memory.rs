use crate::{LedgerError, LedgerInterface};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use topup_types::{ConfigSchema, LedgerRecord, OrderId, OrderStatus, Schema, ValidationError};

/// Process-local ledger, for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryLedger {
	records: DashMap<OrderId, LedgerRecord>,
}

impl MemoryLedger {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	async fn create_record(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
		match self.records.entry(record.order_id) {
			Entry::Occupied(_) => Err(LedgerError::Duplicate(record.order_id)),
			Entry::Vacant(vacant) => {
				vacant.insert(record.clone());
				Ok(())
			}
		}
	}

	async fn update_status_by_order_id(
		&self,
		order_id: OrderId,
		status: OrderStatus,
	) -> Result<(), LedgerError> {
		let mut record = self
			.records
			.get_mut(&order_id)
			.ok_or(LedgerError::NotFound(order_id))?;
		record.status = status;
		record.updated_at = Utc::now();
		Ok(())
	}

	async fn find_by_order_id(
		&self,
		order_id: OrderId,
	) -> Result<Option<LedgerRecord>, LedgerError> {
		Ok(self.records.get(&order_id).map(|r| r.clone()))
	}
}

pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_ledger(_config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	Ok(Box::new(MemoryLedger::new()))
}

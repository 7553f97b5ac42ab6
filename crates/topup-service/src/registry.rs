//! Backends known to the broker binary, by the name used in configuration.

use anyhow::{bail, Result};
use topup_catalog::implementations::static_catalog;
use topup_config::{BackendConfig, Config};
use topup_core::EngineBuilder;
use topup_discovery::implementations::redis as redis_source;
use topup_ledger::implementations::{file as file_ledger, memory as memory_ledger};
use topup_lock::implementations::{memory as memory_lock, redis as redis_lock};
use topup_payment::implementations::{http as http_payment, noop as noop_payment};
use topup_storage::implementations::{file as file_storage, memory as memory_storage, redis as redis_storage};
use topup_types::ConfigSchema;

/// Registers every backend factory on a fresh builder.
pub fn engine_builder(config: Config) -> EngineBuilder {
	EngineBuilder::new(config)
		.with_storage_factory("memory", memory_storage::create_storage)
		.with_storage_factory("file", file_storage::create_storage)
		.with_storage_factory("redis", redis_storage::create_storage)
		.with_lock_factory("memory", memory_lock::create_lock)
		.with_lock_factory("redis", redis_lock::create_lock)
		.with_ledger_factory("memory", memory_ledger::create_ledger)
		.with_ledger_factory("file", file_ledger::create_ledger)
		.with_catalog_factory("static", static_catalog::create_catalog)
		.with_payment_factory("noop", noop_payment::create_payment)
		.with_payment_factory("http", http_payment::create_payment)
		.with_discovery_factory("redis", redis_source::create_source)
}

fn storage_schema(backend: &str) -> Option<Box<dyn ConfigSchema>> {
	match backend {
		"memory" => Some(Box::new(memory_storage::MemoryStorageSchema)),
		"file" => Some(Box::new(file_storage::FileStorageSchema)),
		"redis" => Some(Box::new(redis_storage::RedisStorageSchema)),
		_ => None,
	}
}

fn lock_schema(backend: &str) -> Option<Box<dyn ConfigSchema>> {
	match backend {
		"memory" => Some(Box::new(memory_lock::MemoryLockSchema)),
		"redis" => Some(Box::new(redis_lock::RedisLockSchema)),
		_ => None,
	}
}

fn ledger_schema(backend: &str) -> Option<Box<dyn ConfigSchema>> {
	match backend {
		"memory" => Some(Box::new(memory_ledger::MemoryLedgerSchema)),
		"file" => Some(Box::new(file_ledger::FileLedgerSchema)),
		_ => None,
	}
}

fn catalog_schema(backend: &str) -> Option<Box<dyn ConfigSchema>> {
	match backend {
		"static" => Some(Box::new(static_catalog::StaticCatalogSchema)),
		_ => None,
	}
}

fn payment_schema(backend: &str) -> Option<Box<dyn ConfigSchema>> {
	match backend {
		"noop" => Some(Box::new(noop_payment::NoopPaymentSchema)),
		"http" => Some(Box::new(http_payment::HttpPaymentSchema)),
		_ => None,
	}
}

fn source_schema(name: &str) -> Option<Box<dyn ConfigSchema>> {
	match name {
		"redis" => Some(Box::new(redis_source::RedisConfirmationSourceSchema)),
		_ => None,
	}
}

fn check(
	problems: &mut Vec<String>,
	section: &str,
	backend: &BackendConfig,
	schema_for: fn(&str) -> Option<Box<dyn ConfigSchema>>,
) {
	match schema_for(&backend.backend) {
		Some(schema) => {
			if let Err(e) = schema.validate(&backend.config) {
				problems.push(format!("[{}] {}: {}", section, backend.backend, e));
			}
		}
		None => problems.push(format!("[{}] unknown backend '{}'", section, backend.backend)),
	}
}

/// Validates every backend table against the schema its implementation
/// publishes, reporting all problems at once.
pub fn validate_backends(config: &Config) -> Result<()> {
	let mut problems = Vec::new();

	check(&mut problems, "cache", &config.cache, storage_schema);
	check(
		&mut problems,
		"idempotency",
		config.idempotency_backend(),
		storage_schema,
	);
	check(&mut problems, "lock", &config.lock, lock_schema);
	check(&mut problems, "ledger", &config.ledger, ledger_schema);
	check(&mut problems, "catalog", &config.catalog, catalog_schema);
	check(&mut problems, "payment", &config.payment, payment_schema);

	for (name, source) in &config.discovery.sources {
		match source_schema(name) {
			Some(schema) => {
				if let Err(e) = schema.validate(source) {
					problems.push(format!("[discovery.sources.{}] {}", name, e));
				}
			}
			None => problems.push(format!("[discovery] unknown source '{}'", name)),
		}
	}

	if !problems.is_empty() {
		bail!("Invalid backend configuration:\n  {}", problems.join("\n  "));
	}
	Ok(())
}

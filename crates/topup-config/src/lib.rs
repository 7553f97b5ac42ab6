//! Configuration for the top-up order broker.
//!
//! The configuration is a TOML file. Each pluggable component has a section
//! naming its `backend` and a free-form `config` table that is handed to the
//! backend's factory and checked against the backend's schema.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: ServiceConfig,
	#[serde(default)]
	pub order: OrderConfig,
	pub cache: BackendConfig,
	/// Defaults to the cache backend when omitted.
	#[serde(default)]
	pub idempotency: Option<BackendConfig>,
	pub lock: BackendConfig,
	pub ledger: BackendConfig,
	pub catalog: BackendConfig,
	#[serde(default = "BackendConfig::noop")]
	pub payment: BackendConfig,
	#[serde(default)]
	pub discovery: DiscoveryConfig,
}

impl Config {
	/// Backend used for idempotency verdicts.
	pub fn idempotency_backend(&self) -> &BackendConfig {
		self.idempotency.as_ref().unwrap_or(&self.cache)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_http_host")]
	pub http_host: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: default_name(),
			http_host: default_http_host(),
			http_port: default_http_port(),
			log_level: default_log_level(),
		}
	}
}

/// Order lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderConfig {
	/// Lifetime of a cached order snapshot.
	#[serde(default = "default_cache_ttl_secs")]
	pub cache_ttl_secs: u64,
	/// How long an operation waits for the per-order lock.
	#[serde(default = "default_lock_timeout_secs")]
	pub lock_timeout_secs: u64,
	/// Lifetime of a recorded callback verdict.
	#[serde(default = "default_idempotency_ttl_secs")]
	pub idempotency_ttl_secs: u64,
	/// Rebuild a missing snapshot from the ledger before giving up.
	#[serde(default = "default_true")]
	pub reconcile_on_cache_miss: bool,
	/// Record infrastructure failures as callback verdicts.
	#[serde(default = "default_true")]
	pub cache_infra_failures: bool,
	/// URL providers call back with the fulfillment outcome.
	#[serde(default = "default_callback_url")]
	pub callback_url: String,
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
	/// Period of the sweep that drops expired snapshots and verdicts.
	#[serde(default = "default_purge_interval_secs")]
	pub purge_interval_secs: u64,
}

impl OrderConfig {
	pub fn cache_ttl(&self) -> Duration {
		Duration::from_secs(self.cache_ttl_secs)
	}

	pub fn lock_timeout(&self) -> Duration {
		Duration::from_secs(self.lock_timeout_secs)
	}

	pub fn idempotency_ttl(&self) -> Duration {
		Duration::from_secs(self.idempotency_ttl_secs)
	}

	pub fn purge_interval(&self) -> Duration {
		Duration::from_secs(self.purge_interval_secs)
	}
}

impl Default for OrderConfig {
	fn default() -> Self {
		Self {
			cache_ttl_secs: default_cache_ttl_secs(),
			lock_timeout_secs: default_lock_timeout_secs(),
			idempotency_ttl_secs: default_idempotency_ttl_secs(),
			reconcile_on_cache_miss: true,
			cache_infra_failures: true,
			callback_url: default_callback_url(),
			event_capacity: default_event_capacity(),
			purge_interval_secs: default_purge_interval_secs(),
		}
	}
}

/// Selects a backend implementation and carries its settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl BackendConfig {
	pub fn new(backend: impl Into<String>) -> Self {
		Self {
			backend: backend.into(),
			config: empty_table(),
		}
	}

	fn noop() -> Self {
		Self::new("noop")
	}
}

/// Message-bus confirmation sources, keyed by implementation name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryConfig {
	#[serde(default)]
	pub sources: HashMap<String, toml::Value>,
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

fn default_true() -> bool {
	true
}

fn default_name() -> String {
	"topup-broker".to_string()
}

fn default_http_host() -> String {
	"0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
	30 * 60
}

fn default_lock_timeout_secs() -> u64 {
	5 * 60
}

fn default_idempotency_ttl_secs() -> u64 {
	24 * 60 * 60
}

fn default_callback_url() -> String {
	"http://localhost:8080/v1/api/order/update-status".to_string()
}

fn default_event_capacity() -> usize {
	1000
}

fn default_purge_interval_secs() -> u64 {
	60
}

use std::collections::HashMap;
use std::sync::Arc;

use topup_catalog::{CatalogError, CatalogInterface};
use topup_config::{BackendConfig, Config};
use topup_delivery::{ProviderRouter, RpcClient};
use topup_discovery::{ConfirmationSourceInterface, DiscoveryError, DiscoveryService};
use topup_ledger::{LedgerError, LedgerInterface, LedgerService};
use topup_lock::{LockError, LockInterface, LockService};
use topup_payment::{PaymentError, PaymentInterface};
use topup_storage::{StorageError, StorageInterface, StorageService};
use topup_types::{EventBus, Provider};

use crate::{EngineError, IdempotencyGuard, OrderCache, OrderEngine};

// Type aliases for factory functions
type StorageFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send>;
type LockFactory = Box<dyn Fn(&toml::Value) -> Result<Box<dyn LockInterface>, LockError> + Send>;
type LedgerFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> + Send>;
type CatalogFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError> + Send>;
type PaymentFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> + Send>;
type DiscoveryFactory = Box<
	dyn Fn(&toml::Value) -> Result<Box<dyn ConfirmationSourceInterface>, DiscoveryError> + Send,
>;
type RpcFactory = Box<dyn Fn(&Provider) -> Arc<dyn RpcClient> + Send + Sync>;

fn missing(kind: &str, backend: &BackendConfig) -> EngineError {
	EngineError::Config(format!("Unknown {} backend '{}'", kind, backend.backend))
}

fn failed(kind: &str, e: impl std::fmt::Display) -> EngineError {
	EngineError::Config(format!("Failed to create {} backend: {}", kind, e))
}

/// Assembles an [`OrderEngine`] from configuration and registered backend
/// factories.
pub struct EngineBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	lock_factories: HashMap<String, LockFactory>,
	ledger_factories: HashMap<String, LedgerFactory>,
	catalog_factories: HashMap<String, CatalogFactory>,
	payment_factories: HashMap<String, PaymentFactory>,
	discovery_factories: HashMap<String, DiscoveryFactory>,
	extra_sources: Vec<Box<dyn ConfirmationSourceInterface>>,
	rpc_factory: Option<RpcFactory>,
	http_client: Option<reqwest::Client>,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			lock_factories: HashMap::new(),
			ledger_factories: HashMap::new(),
			catalog_factories: HashMap::new(),
			payment_factories: HashMap::new(),
			discovery_factories: HashMap::new(),
			extra_sources: Vec::new(),
			rpc_factory: None,
			http_client: None,
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_lock_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn LockInterface>, LockError> + Send + 'static,
	{
		self.lock_factories.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_ledger_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> + Send + 'static,
	{
		self.ledger_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_catalog_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn CatalogInterface>, CatalogError> + Send + 'static,
	{
		self.catalog_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_payment_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> + Send + 'static,
	{
		self.payment_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_discovery_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn ConfirmationSourceInterface>, DiscoveryError>
			+ Send
			+ 'static,
	{
		self.discovery_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	/// Adds a confirmation source that is not described by the configuration.
	pub fn with_confirmation_source(mut self, source: Box<dyn ConfirmationSourceInterface>) -> Self {
		self.extra_sources.push(source);
		self
	}

	/// Overrides how RPC providers are reached. Defaults to JSON-RPC over HTTP.
	pub fn with_rpc_client_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&Provider) -> Arc<dyn RpcClient> + Send + Sync + 'static,
	{
		self.rpc_factory = Some(Box::new(factory));
		self
	}

	pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
		self.http_client = Some(client);
		self
	}

	fn storage(&self, kind: &str, backend: &BackendConfig) -> Result<StorageService, EngineError> {
		let factory = self
			.storage_factories
			.get(&backend.backend)
			.ok_or_else(|| missing(kind, backend))?;
		let storage = factory(&backend.config).map_err(|e| failed(kind, e))?;
		Ok(StorageService::new(storage))
	}

	pub async fn build(self) -> Result<OrderEngine, EngineError> {
		let config = &self.config;
		let settings = config.order.clone();

		let cache = OrderCache::new(self.storage("cache", &config.cache)?, settings.cache_ttl());
		let guard = IdempotencyGuard::new(
			self.storage("idempotency", config.idempotency_backend())?,
			settings.idempotency_ttl(),
			settings.cache_infra_failures,
		);

		let lock_factory = self
			.lock_factories
			.get(&config.lock.backend)
			.ok_or_else(|| missing("lock", &config.lock))?;
		let lock = LockService::new(lock_factory(&config.lock.config).map_err(|e| failed("lock", e))?);

		let ledger_factory = self
			.ledger_factories
			.get(&config.ledger.backend)
			.ok_or_else(|| missing("ledger", &config.ledger))?;
		let ledger =
			LedgerService::new(ledger_factory(&config.ledger.config).map_err(|e| failed("ledger", e))?);

		let catalog_factory = self
			.catalog_factories
			.get(&config.catalog.backend)
			.ok_or_else(|| missing("catalog", &config.catalog))?;
		let catalog = catalog_factory(&config.catalog.config).map_err(|e| failed("catalog", e))?;

		let payment_factory = self
			.payment_factories
			.get(&config.payment.backend)
			.ok_or_else(|| missing("payment", &config.payment))?;
		let payment: Arc<dyn PaymentInterface> = Arc::from(
			payment_factory(&config.payment.config).map_err(|e| failed("payment", e))?,
		);

		// The router is built once; a bad provider halts startup
		let providers = catalog
			.get_providers_with_suppliers()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let http_client = self.http_client.clone().unwrap_or_default();
		let router = match &self.rpc_factory {
			Some(factory) => ProviderRouter::build(
				providers,
				&settings.callback_url,
				http_client,
				factory.as_ref(),
			),
			None => ProviderRouter::with_json_rpc(providers, &settings.callback_url, http_client),
		}
		.map_err(|e| EngineError::Config(e.to_string()))?;

		let mut sources = Vec::new();
		for (name, source_config) in &config.discovery.sources {
			let factory = self.discovery_factories.get(name).ok_or_else(|| {
				EngineError::Config(format!("Unknown confirmation source '{}'", name))
			})?;
			sources.push(factory(source_config).map_err(|e| failed("discovery", e))?);
		}
		let mut extra_sources = self.extra_sources;
		sources.append(&mut extra_sources);

		tracing::info!(
			cache = %config.cache.backend,
			lock = %config.lock.backend,
			ledger = %config.ledger.backend,
			sources = sources.len(),
			"Order engine assembled"
		);

		Ok(OrderEngine {
			event_bus: EventBus::new(settings.event_capacity),
			settings,
			cache,
			guard,
			lock,
			ledger,
			catalog,
			payment,
			router: Arc::new(router),
			discovery: DiscoveryService::new(sources),
		})
	}
}

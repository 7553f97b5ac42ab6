#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use topup_config::Config;
use topup_core::{EngineBuilder, OrderEngine};
use topup_delivery::{DeliveryError, RpcClient};
use topup_ledger::implementations::memory::MemoryLedger;
use topup_ledger::{LedgerError, LedgerInterface};
use topup_lock::implementations::memory::MemoryLock;
use topup_lock::{Lease, LockError, LockInterface};
use topup_payment::{PaymentError, PaymentInterface};
use topup_storage::implementations::memory::MemoryStorage;
use topup_storage::{StorageError, StorageInterface};
use topup_types::{
	LedgerRecord, OrderConfirmRequest, OrderEvent, OrderId, OrderResponse, OrderSnapshot,
	OrderStatus, OrderUpdateRequest, ProviderOrderRequest,
};

pub const CALLBACK_URL: &str = "http://broker.test/v1/api/order/update-status";

const BACKENDS: &str = r#"
[cache]
backend = "memory"

[idempotency]
backend = "memory"

[lock]
backend = "memory"

[ledger]
backend = "counting"

[catalog]
backend = "static"

[[catalog.config.products]]
id = 1
name = "Pulsa 10k"
price = 10000
supplier_code = "VTL"
cash_back = { type = "percentage", value = 5 }

[[catalog.config.products]]
id = 2
name = "Data 5GB"
price = 25000
supplier_code = "TSL"
cash_back = { type = "fixed", value = 1000 }

[[catalog.config.providers]]
code = "P-RPC"
type = "grpc"
address = "http://provider.test/rpc"
weight = 100
suppliers = ["VTL", "TSL"]

[payment]
backend = "recording"
"#;

/// Ledger that counts writes so tests can assert exactly-once effects.
#[derive(Default)]
pub struct CountingLedger {
	inner: MemoryLedger,
	pub creates: AtomicUsize,
	pub updates: AtomicUsize,
}

impl CountingLedger {
	pub fn creates(&self) -> usize {
		self.creates.load(Ordering::SeqCst)
	}

	pub fn updates(&self) -> usize {
		self.updates.load(Ordering::SeqCst)
	}

	pub async fn find(&self, order_id: OrderId) -> Option<LedgerRecord> {
		self.inner.find_by_order_id(order_id).await.unwrap()
	}
}

struct SharedLedger(Arc<CountingLedger>);

#[async_trait]
impl LedgerInterface for SharedLedger {
	async fn create_record(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
		self.0.inner.create_record(record).await?;
		self.0.creates.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn update_status_by_order_id(
		&self,
		order_id: OrderId,
		status: OrderStatus,
	) -> Result<(), LedgerError> {
		self.0
			.inner
			.update_status_by_order_id(order_id, status)
			.await?;
		self.0.updates.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn find_by_order_id(
		&self,
		order_id: OrderId,
	) -> Result<Option<LedgerRecord>, LedgerError> {
		self.0.inner.find_by_order_id(order_id).await
	}
}

struct SharedStorage(Arc<MemoryStorage>);

#[async_trait]
impl StorageInterface for SharedStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.0.get_bytes(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.0.set_bytes(key, value, ttl).await
	}

	async fn set_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		self.0.set_if_absent(key, value, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.0.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.0.exists(key).await
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		self.0.purge_expired().await
	}
}

struct SharedLock(Arc<MemoryLock>);

#[async_trait]
impl LockInterface for SharedLock {
	async fn try_acquire(&self, key: &str, timeout: Duration) -> Result<Lease, LockError> {
		self.0.try_acquire(key, timeout).await
	}

	async fn release(&self, lease: &Lease) -> Result<(), LockError> {
		self.0.release(lease).await
	}
}

#[derive(Default)]
pub struct RecordingRpc {
	pub calls: Mutex<Vec<ProviderOrderRequest>>,
}

impl RecordingRpc {
	pub fn calls(&self) -> Vec<ProviderOrderRequest> {
		self.calls.lock().unwrap().clone()
	}
}

#[async_trait]
impl RpcClient for RecordingRpc {
	async fn submit(&self, request: &ProviderOrderRequest) -> Result<(), DeliveryError> {
		self.calls.lock().unwrap().push(request.clone());
		Ok(())
	}
}

#[derive(Default)]
pub struct RecordingPayment {
	pub created: Mutex<Vec<OrderId>>,
	pub failed: Mutex<Vec<(OrderId, OrderStatus)>>,
}

impl RecordingPayment {
	pub fn created(&self) -> Vec<OrderId> {
		self.created.lock().unwrap().clone()
	}

	pub fn failed(&self) -> Vec<(OrderId, OrderStatus)> {
		self.failed.lock().unwrap().clone()
	}
}

struct SharedPayment(Arc<RecordingPayment>);

#[async_trait]
impl PaymentInterface for SharedPayment {
	async fn order_created(&self, order: &OrderSnapshot) -> Result<(), PaymentError> {
		self.0.created.lock().unwrap().push(order.order_id);
		Ok(())
	}

	async fn order_failed(&self, order_id: OrderId, status: OrderStatus) -> Result<(), PaymentError> {
		self.0.failed.lock().unwrap().push((order_id, status));
		Ok(())
	}
}

pub struct Harness {
	pub engine: Arc<OrderEngine>,
	pub ledger: Arc<CountingLedger>,
	pub cache: Arc<MemoryStorage>,
	pub lock: Arc<MemoryLock>,
	pub rpc: Arc<RecordingRpc>,
	pub payment: Arc<RecordingPayment>,
}

/// Test configuration; `order` holds extra `[order]` keys.
pub fn config(order: &str) -> Config {
	let text = format!(
		"[order]\ncallback_url = \"{}\"\n{}\n{}",
		CALLBACK_URL, order, BACKENDS
	);
	toml::from_str(&text).unwrap()
}

pub async fn harness_with(config: Config) -> Harness {
	let (builder, parts) = builder_parts(config);
	let engine = Arc::new(builder.build().await.unwrap());
	parts.into_harness(engine)
}

pub async fn harness() -> Harness {
	harness_with(config("")).await
}

pub struct Parts {
	ledger: Arc<CountingLedger>,
	cache: Arc<MemoryStorage>,
	lock: Arc<MemoryLock>,
	rpc: Arc<RecordingRpc>,
	payment: Arc<RecordingPayment>,
}

impl Parts {
	pub fn into_harness(self, engine: Arc<OrderEngine>) -> Harness {
		Harness {
			engine,
			ledger: self.ledger,
			cache: self.cache,
			lock: self.lock,
			rpc: self.rpc,
			payment: self.payment,
		}
	}
}

pub fn builder_parts(config: Config) -> (EngineBuilder, Parts) {
	let ledger = Arc::new(CountingLedger::default());
	let cache = Arc::new(MemoryStorage::new());
	let lock = Arc::new(MemoryLock::new(Duration::from_secs(30)));
	let rpc = Arc::new(RecordingRpc::default());
	let payment = Arc::new(RecordingPayment::default());

	let builder = EngineBuilder::new(config)
		.with_storage_factory("memory", {
			let cache = cache.clone();
			move |_| Ok(Box::new(SharedStorage(cache.clone())) as Box<dyn StorageInterface>)
		})
		.with_lock_factory("memory", {
			let lock = lock.clone();
			move |_| Ok(Box::new(SharedLock(lock.clone())) as Box<dyn LockInterface>)
		})
		.with_ledger_factory("counting", {
			let ledger = ledger.clone();
			move |_| Ok(Box::new(SharedLedger(ledger.clone())) as Box<dyn LedgerInterface>)
		})
		.with_catalog_factory(
			"static",
			topup_catalog::implementations::static_catalog::create_catalog,
		)
		.with_payment_factory("recording", {
			let payment = payment.clone();
			move |_| Ok(Box::new(SharedPayment(payment.clone())) as Box<dyn PaymentInterface>)
		})
		.with_rpc_client_factory({
			let rpc = rpc.clone();
			move |_| rpc.clone() as Arc<dyn RpcClient>
		});

	let parts = Parts {
		ledger,
		cache,
		lock,
		rpc,
		payment,
	};
	(builder, parts)
}

pub fn confirmation(order: &OrderResponse, status: OrderStatus) -> OrderConfirmRequest {
	OrderConfirmRequest {
		order_id: order.order_id,
		user_id: order.user_id,
		sku_id: order.sku_id,
		total_price: order.total_price,
		status,
		phone_number: order.phone_number.clone(),
		cash_back_value: order.cash_back_value,
	}
}

pub fn update(order_id: OrderId, status: OrderStatus) -> OrderUpdateRequest {
	OrderUpdateRequest {
		order_id,
		status,
		phone_number: String::new(),
	}
}

/// Waits until `check` holds, yielding to let detached tasks run.
pub async fn eventually<F: Fn() -> bool>(check: F) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !check() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition not reached in time");
}

/// Next event matching `pred`, skipping others.
pub async fn next_event<F: Fn(&OrderEvent) -> bool>(
	rx: &mut tokio::sync::broadcast::Receiver<OrderEvent>,
	pred: F,
) -> OrderEvent {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let event = rx.recv().await.unwrap();
			if pred(&event) {
				return event;
			}
		}
	})
	.await
	.expect("event not received in time")
}

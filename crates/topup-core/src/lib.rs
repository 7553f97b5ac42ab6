//! Order lifecycle orchestration.
//!
//! The [`OrderEngine`] owns the three operations that move an order through
//! `pending -> confirm -> success | failed`:
//!
//! - [`OrderEngine::create_order`] prices a product and caches a pending order.
//! - [`OrderEngine::confirm_order`] applies the payment subsystem's verdict
//!   and dispatches fulfillment.
//! - [`OrderEngine::update_order_status`] applies the provider's outcome.
//!
//! Confirm and update run under a per-order lock, so each order sees its
//! transitions strictly one at a time while different orders proceed in
//! parallel. Provider callbacks are additionally deduplicated by the
//! idempotency guard.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use topup_catalog::CatalogInterface;
use topup_config::OrderConfig;
use topup_delivery::ProviderRouter;
use topup_discovery::DiscoveryService;
use topup_ledger::LedgerService;
use topup_lock::LockService;
use topup_payment::PaymentInterface;
use topup_storage::StorageError;
use topup_types::{
	EventBus, LedgerRecord, OrderConfirmRequest, OrderError, OrderEvent, OrderId, OrderRequest,
	OrderResponse, OrderSnapshot, OrderStatus, OrderUpdateRequest,
};

mod builder;
mod cache;
mod errors;
mod idempotency;
pub mod order_id;

pub use builder::EngineBuilder;
pub use cache::OrderCache;
pub use idempotency::IdempotencyGuard;

use errors::*;

/// Attempts at finding a free order id before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

pub struct OrderEngine {
	settings: OrderConfig,
	cache: OrderCache,
	guard: IdempotencyGuard,
	lock: LockService,
	ledger: LedgerService,
	catalog: Box<dyn CatalogInterface>,
	payment: Arc<dyn PaymentInterface>,
	router: Arc<ProviderRouter>,
	discovery: DiscoveryService,
	event_bus: EventBus,
}

fn lock_key(order_id: OrderId) -> String {
	format!("order:{}", order_id)
}

impl OrderEngine {
	/// Creates a pending order for the requested product.
	#[instrument(skip_all, fields(user_id = request.user_id, sku_id = request.sku_id))]
	pub async fn create_order(&self, request: OrderRequest) -> Result<OrderResponse, OrderError> {
		let product = self
			.catalog
			.get_product_by_id(request.sku_id)
			.await
			.map_err(from_catalog)?;

		let cash_back_value = product.cash_back.compute(product.price).ok_or_else(|| {
			OrderError::Infra(format!("cash back of sku {} overflows its price", product.id))
		})?;

		let mut snapshot = OrderSnapshot {
			order_id: 0,
			user_id: request.user_id,
			sku_id: product.id,
			supplier_code: product.supplier_code.clone(),
			phone_number: request.phone_number,
			price: product.price,
			total_price: product.price,
			cash_back_value,
			status: OrderStatus::Pending,
			random_provider_weight: self.router.draw(&product.supplier_code),
			created_at: chrono::Utc::now(),
		};

		let mut stored = false;
		for _ in 0..MAX_ID_ATTEMPTS {
			snapshot.order_id = order_id::next_order_id();
			if self.cache.insert_new(&snapshot).await.map_err(from_storage)? {
				stored = true;
				break;
			}
			tracing::warn!(order_id = snapshot.order_id, "Order id collision, retrying");
		}
		if !stored {
			return Err(OrderError::Infra("could not allocate an order id".into()));
		}

		tracing::info!(
			order_id = snapshot.order_id,
			total_price = snapshot.total_price,
			cash_back_value = snapshot.cash_back_value,
			"Order created"
		);
		self.publish(OrderEvent::Created {
			order_id: snapshot.order_id,
			supplier_code: snapshot.supplier_code.clone(),
		});

		let payment = self.payment.clone();
		let pending = snapshot.clone();
		tokio::spawn(async move {
			if let Err(e) = payment.order_created(&pending).await {
				tracing::error!(order_id = pending.order_id, error = %e, "Failed to announce pending order");
			}
		});

		Ok(OrderResponse::from(&snapshot))
	}

	/// Applies a payment confirmation to a pending order.
	#[instrument(skip_all, fields(order_id = request.order_id, status = %request.status))]
	pub async fn confirm_order(&self, request: OrderConfirmRequest) -> Result<(), OrderError> {
		let lease = self
			.lock
			.acquire(&lock_key(request.order_id), self.settings.lock_timeout())
			.await
			.map_err(from_lock)?;

		let result = self.confirm_locked(&request).await;
		self.lock.release(&lease).await;

		if let Err(e) = &result {
			tracing::warn!(error = %e, "Confirmation rejected");
		}
		result
	}

	async fn confirm_locked(&self, request: &OrderConfirmRequest) -> Result<(), OrderError> {
		let mut snapshot = self.load_snapshot(request.order_id).await?;

		if !snapshot.matches_confirmation(request) {
			return Err(OrderError::ValidationMismatch(ORDER_MISMATCH.into()));
		}
		match request.status {
			OrderStatus::Pending => {
				return Err(OrderError::InvalidTransition(ORDER_PENDING.into()));
			}
			OrderStatus::Settled => {
				return Err(OrderError::InvalidTransition(SETTLE_BEFORE_CONFIRM.into()));
			}
			OrderStatus::Confirmed | OrderStatus::Rejected => {}
		}
		if snapshot.status != OrderStatus::Pending {
			return Err(OrderError::InvalidTransition(ORDER_ALREADY_PROCESSED.into()));
		}

		self.ledger
			.create_record(&LedgerRecord::from_snapshot(&snapshot, request.status))
			.await
			.map_err(from_ledger)?;

		let previous = snapshot.status;
		snapshot.status = request.status;
		self.cache.set(&snapshot).await.map_err(from_storage)?;

		if snapshot.status == OrderStatus::Confirmed {
			self.publish(OrderEvent::Confirmed {
				order_id: snapshot.order_id,
			});
			self.dispatch(&snapshot);
		} else {
			self.publish(OrderEvent::Rejected {
				order_id: snapshot.order_id,
				previous,
			});
		}

		tracing::info!(status = %snapshot.status, "Order confirmation applied");
		Ok(())
	}

	/// Applies a provider's fulfillment outcome to a confirmed order.
	#[instrument(skip_all, fields(order_id = request.order_id, status = %request.status))]
	pub async fn update_order_status(&self, request: OrderUpdateRequest) -> Result<(), OrderError> {
		if let Some(verdict) = self.recorded_verdict(request.order_id).await? {
			tracing::debug!("Replaying recorded callback verdict");
			return verdict.replay();
		}

		let lease = self
			.lock
			.acquire(&lock_key(request.order_id), self.settings.lock_timeout())
			.await
			.map_err(from_lock)?;

		let result = self.update_guarded(&request).await;
		self.lock.release(&lease).await;

		if let Err(e) = &result {
			tracing::warn!(error = %e, "Status update rejected");
		}
		result
	}

	async fn update_guarded(&self, request: &OrderUpdateRequest) -> Result<(), OrderError> {
		// A concurrent duplicate may have finished while this one waited for the lock
		if let Some(verdict) = self.recorded_verdict(request.order_id).await? {
			tracing::debug!("Replaying verdict recorded while waiting for the lock");
			return verdict.replay();
		}

		let outcome = self.update_locked(request).await;
		self.guard.record(request.order_id, &outcome).await;
		outcome
	}

	async fn update_locked(&self, request: &OrderUpdateRequest) -> Result<(), OrderError> {
		let mut snapshot = self.load_snapshot(request.order_id).await?;

		if snapshot.status != OrderStatus::Confirmed {
			return Err(OrderError::InvalidTransition(ORDER_NOT_CONFIRMED.into()));
		}
		if !snapshot.status.can_transition_to(request.status) {
			return Err(OrderError::InvalidTransition(UNSUPPORTED_UPDATE_STATUS.into()));
		}

		self.ledger
			.update_status(request.order_id, request.status)
			.await
			.map_err(from_ledger)?;

		let previous = snapshot.status;
		snapshot.status = request.status;
		self.cache.set(&snapshot).await.map_err(from_storage)?;

		if snapshot.status == OrderStatus::Settled {
			self.publish(OrderEvent::Settled {
				order_id: snapshot.order_id,
			});
		} else {
			self.publish(OrderEvent::Rejected {
				order_id: snapshot.order_id,
				previous,
			});

			let payment = self.payment.clone();
			let (order_id, status) = (snapshot.order_id, snapshot.status);
			tokio::spawn(async move {
				if let Err(e) = payment.order_failed(order_id, status).await {
					tracing::error!(order_id, error = %e, "Failed to report failed order");
				}
			});
		}

		tracing::info!(status = %snapshot.status, "Order status updated");
		Ok(())
	}

	async fn recorded_verdict(
		&self,
		order_id: OrderId,
	) -> Result<Option<topup_types::IdempotencyVerdict>, OrderError> {
		self.guard
			.lookup(order_id)
			.await
			.map_err(|e| OrderError::Infra(format!("idempotency store: {}", e)))
	}

	/// Reads the cached snapshot, rebuilding it from the ledger on a miss when
	/// reconciliation is enabled.
	async fn load_snapshot(&self, order_id: OrderId) -> Result<OrderSnapshot, OrderError> {
		match self.cache.get(order_id).await {
			Ok(snapshot) => Ok(snapshot),
			Err(StorageError::NotFound) if self.settings.reconcile_on_cache_miss => {
				let record = self
					.ledger
					.find(order_id)
					.await
					.map_err(from_ledger)?
					.ok_or_else(|| OrderError::NotFound(ORDER_NOT_FOUND.into()))?;

				let snapshot = record.to_snapshot();
				self.cache.set(&snapshot).await.map_err(from_storage)?;
				tracing::info!(order_id, status = %snapshot.status, "Order snapshot rebuilt from ledger");
				Ok(snapshot)
			}
			Err(e) => Err(from_storage(e)),
		}
	}

	fn dispatch(&self, snapshot: &OrderSnapshot) {
		if let Err(e) = self.router.dispatch(snapshot, &self.event_bus) {
			let error = from_delivery(e);
			tracing::error!(order_id = snapshot.order_id, error = %error, "Could not dispatch order");
			self.publish(OrderEvent::DispatchFailed {
				order_id: snapshot.order_id,
				reason: error.to_string(),
			});
		}
	}

	fn publish(&self, event: OrderEvent) {
		// no subscribers is fine
		let _ = self.event_bus.publish(event);
	}

	/// Feeds message-bus confirmations into [`Self::confirm_order`] until
	/// `shutdown` resolves.
	///
	/// Each confirmation runs in its own task; failures are logged and the
	/// message is dropped. Expired snapshots and verdicts are swept every
	/// `purge_interval_secs` while the loop runs.
	pub async fn run<F>(self: &Arc<Self>, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let (confirm_tx, mut confirm_rx) = mpsc::unbounded_channel();
		self.discovery
			.start_all(confirm_tx)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		tracing::info!("Confirmation intake started");

		let sweeper = {
			let engine = Arc::clone(self);
			tokio::spawn(async move { engine.purge_periodically().await })
		};

		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				Some(request) = confirm_rx.recv() => {
					let engine = Arc::clone(self);
					tokio::spawn(async move {
						let order_id = request.order_id;
						if let Err(e) = engine.confirm_order(request).await {
							tracing::warn!(order_id, error = %e, "Dropping bus confirmation");
						}
					});
				}
				_ = &mut shutdown => {
					tracing::info!("Shutting down confirmation intake");
					break;
				}
			}
		}

		sweeper.abort();
		self.discovery
			.stop_all()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		Ok(())
	}

	/// Drops expired order snapshots and callback verdicts from storage.
	///
	/// Returns how many entries were removed in total.
	pub async fn purge_expired(&self) -> Result<usize, StorageError> {
		let orders = self.cache.purge_expired().await?;
		let verdicts = self.guard.purge_expired().await?;
		Ok(orders + verdicts)
	}

	async fn purge_periodically(&self) {
		let period = self.settings.purge_interval();
		if period.is_zero() {
			return;
		}

		let mut ticker = tokio::time::interval(period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			match self.purge_expired().await {
				Ok(0) => {}
				Ok(removed) => tracing::debug!(removed, "Purged expired entries"),
				Err(e) => tracing::warn!(error = %e, "Failed to purge expired entries"),
			}
		}
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn settings(&self) -> &OrderConfig {
		&self.settings
	}
}

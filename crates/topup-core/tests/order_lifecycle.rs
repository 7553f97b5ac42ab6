mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use topup_discovery::implementations::channel::ChannelSource;
use topup_lock::LockInterface;
use topup_storage::StorageInterface;
use topup_types::{
	OrderConfirmRequest, OrderError, OrderEvent, OrderRequest, OrderResponse, OrderStatus,
};

fn request(sku_id: u64) -> OrderRequest {
	OrderRequest {
		user_id: 1,
		sku_id,
		phone_number: "08123".into(),
	}
}

async fn confirmed_order(h: &Harness) -> OrderResponse {
	let order = h.engine.create_order(request(1)).await.unwrap();
	h.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await
		.unwrap();
	order
}

#[tokio::test]
async fn test_create_prices_the_product() {
	let h = harness().await;

	let order = h.engine.create_order(request(1)).await.unwrap();
	assert_eq!(order.total_price, 10000);
	assert_eq!(order.cash_back_value, 500);
	assert_eq!(order.status, OrderStatus::Pending);
	assert_eq!(order.phone_number, "08123");

	let fixed = h.engine.create_order(request(2)).await.unwrap();
	assert_eq!(fixed.total_price, 25000);
	assert_eq!(fixed.cash_back_value, 1000);
	assert_ne!(order.order_id, fixed.order_id);

	// the payment subsystem hears about both pending orders
	let payment = h.payment.clone();
	eventually(move || payment.created().len() == 2).await;
	assert_eq!(h.ledger.creates(), 0);
}

#[tokio::test]
async fn test_create_unknown_sku() {
	let h = harness().await;

	let result = h.engine.create_order(request(99)).await;
	assert_eq!(result, Err(OrderError::NotFound("sku not found".into())));
}

#[tokio::test]
async fn test_full_lifecycle() {
	let h = harness().await;
	let mut events = h.engine.event_bus().subscribe();

	let order = confirmed_order(&h).await;

	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Confirmed);
	assert_eq!(record.total_price, 10000);
	assert_eq!(record.cash_back_value, 500);
	assert_eq!(record.supplier_code, "VTL");

	next_event(&mut events, |e| matches!(e, OrderEvent::Created { .. })).await;
	next_event(&mut events, |e| matches!(e, OrderEvent::Confirmed { .. })).await;
	let dispatched =
		next_event(&mut events, |e| matches!(e, OrderEvent::DispatchRequested { .. })).await;
	assert_eq!(
		dispatched,
		OrderEvent::DispatchRequested {
			order_id: order.order_id,
			provider_code: "P-RPC".into(),
		}
	);

	let rpc = h.rpc.clone();
	eventually(move || rpc.calls().len() == 1).await;
	let call = &h.rpc.calls()[0];
	assert_eq!(call.order_id, order.order_id);
	assert_eq!(call.total_price, 10000);
	assert_eq!(call.callback_url, CALLBACK_URL);

	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await
		.unwrap();
	next_event(&mut events, |e| matches!(e, OrderEvent::Settled { .. })).await;

	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Settled);
	assert!(h.payment.failed().is_empty());
}

#[tokio::test]
async fn test_confirm_rejects_mismatched_fields() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let mutations: Vec<Box<dyn Fn(&mut OrderConfirmRequest)>> = vec![
		Box::new(|r: &mut OrderConfirmRequest| r.user_id += 1),
		Box::new(|r: &mut OrderConfirmRequest| r.total_price -= 1),
		Box::new(|r: &mut OrderConfirmRequest| r.phone_number = "08999".into()),
		Box::new(|r: &mut OrderConfirmRequest| r.cash_back_value = 0),
	];
	for mutate in mutations {
		let mut confirm = confirmation(&order, OrderStatus::Confirmed);
		mutate(&mut confirm);
		let result = h.engine.confirm_order(confirm).await;
		assert_eq!(
			result,
			Err(OrderError::ValidationMismatch("order mismatch".into()))
		);
	}

	assert_eq!(h.ledger.creates(), 0);
	// the order is still pending and confirmable
	h.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await
		.unwrap();
}

#[tokio::test]
async fn test_confirm_status_rules() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let pending = h
		.engine
		.confirm_order(confirmation(&order, OrderStatus::Pending))
		.await;
	assert_eq!(
		pending,
		Err(OrderError::InvalidTransition("order is pending".into()))
	);

	let settled = h
		.engine
		.confirm_order(confirmation(&order, OrderStatus::Settled))
		.await;
	assert!(matches!(settled, Err(OrderError::InvalidTransition(_))));

	h.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await
		.unwrap();
	let again = h
		.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await;
	assert_eq!(
		again,
		Err(OrderError::InvalidTransition(
			"order already confirmed or failed".into()
		))
	);
	assert_eq!(h.ledger.creates(), 1);
}

#[tokio::test]
async fn test_confirm_unknown_order() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let mut confirm = confirmation(&order, OrderStatus::Confirmed);
	confirm.order_id += 1;
	let result = h.engine.confirm_order(confirm).await;
	assert_eq!(
		result,
		Err(OrderError::NotFound("order not found or expired".into()))
	);
}

#[tokio::test(start_paused = true)]
async fn test_pending_order_expires_before_confirmation() {
	let h = harness_with(config("cache_ttl_secs = 60")).await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	tokio::time::advance(Duration::from_secs(61)).await;

	// nothing reached the ledger, so reconciliation cannot bring it back
	let result = h
		.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await;
	assert_eq!(
		result,
		Err(OrderError::NotFound("order not found or expired".into()))
	);
	assert_eq!(h.ledger.creates(), 0);
	assert!(h.ledger.find(order.order_id).await.is_none());

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(h.rpc.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_purge_drops_expired_orders_and_verdicts() {
	let h = harness_with(config("cache_ttl_secs = 60\nidempotency_ttl_secs = 120")).await;
	let abandoned = h.engine.create_order(request(1)).await.unwrap();
	let settled = confirmed_order(&h).await;
	h.engine
		.update_order_status(update(settled.order_id, OrderStatus::Settled))
		.await
		.unwrap();
	// two snapshots and one verdict
	assert_eq!(h.cache.len(), 3);

	tokio::time::advance(Duration::from_secs(61)).await;
	assert_eq!(h.engine.purge_expired().await.unwrap(), 2);
	assert_eq!(h.cache.len(), 1);
	assert!(!h
		.cache
		.exists(&format!("orders:{}", abandoned.order_id))
		.await
		.unwrap());

	tokio::time::advance(Duration::from_secs(60)).await;
	assert_eq!(h.engine.purge_expired().await.unwrap(), 1);
	assert!(h.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_sweeps_expired_entries() {
	let h = harness_with(config("cache_ttl_secs = 60\npurge_interval_secs = 5")).await;
	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
	let runner = {
		let engine = Arc::clone(&h.engine);
		tokio::spawn(async move {
			engine
				.run(async {
					let _ = stop_rx.await;
				})
				.await
		})
	};

	for _ in 0..10 {
		h.engine.create_order(request(1)).await.unwrap();
	}
	assert_eq!(h.cache.len(), 10);

	tokio::time::sleep(Duration::from_secs(70)).await;
	assert!(h.cache.is_empty());

	stop_tx.send(()).unwrap();
	runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_payment_does_not_dispatch() {
	let h = harness().await;
	let mut events = h.engine.event_bus().subscribe();
	let order = h.engine.create_order(request(1)).await.unwrap();

	h.engine
		.confirm_order(confirmation(&order, OrderStatus::Rejected))
		.await
		.unwrap();

	let rejected = next_event(&mut events, |e| matches!(e, OrderEvent::Rejected { .. })).await;
	assert_eq!(
		rejected,
		OrderEvent::Rejected {
			order_id: order.order_id,
			previous: OrderStatus::Pending,
		}
	);
	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Rejected);

	// a rejected order never reaches a provider and cannot be settled
	let result = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert_eq!(
		result,
		Err(OrderError::InvalidTransition(
			"order is not confirmed or failed".into()
		))
	);
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(h.rpc.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_write_once() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let mut handles = Vec::new();
	for _ in 0..8 {
		let engine = Arc::clone(&h.engine);
		let confirm = confirmation(&order, OrderStatus::Confirmed);
		handles.push(tokio::spawn(async move { engine.confirm_order(confirm).await }));
	}

	let mut accepted = 0;
	for handle in handles {
		match handle.await.unwrap() {
			Ok(()) => accepted += 1,
			Err(e) => assert!(matches!(e, OrderError::InvalidTransition(_)), "{}", e),
		}
	}
	assert_eq!(accepted, 1);
	assert_eq!(h.ledger.creates(), 1);

	let rpc = h.rpc.clone();
	eventually(move || rpc.calls().len() == 1).await;
}

#[tokio::test]
async fn test_update_requires_confirmed_order() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let result = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert_eq!(
		result,
		Err(OrderError::InvalidTransition(
			"order is not confirmed or failed".into()
		))
	);
	assert_eq!(h.ledger.updates(), 0);
}

#[tokio::test]
async fn test_update_rejects_non_terminal_status() {
	let h = harness().await;
	let order = confirmed_order(&h).await;

	let result = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Pending))
		.await;
	assert_eq!(
		result,
		Err(OrderError::InvalidTransition(
			"update status must be success or failed".into()
		))
	);
}

#[tokio::test]
async fn test_duplicate_callbacks_replay_first_verdict() {
	let h = harness().await;
	let order = confirmed_order(&h).await;

	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await
		.unwrap();
	// a late contradicting callback gets the recorded answer
	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Rejected))
		.await
		.unwrap();

	assert_eq!(h.ledger.updates(), 1);
	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Settled);
}

#[tokio::test]
async fn test_failed_verdict_is_replayed() {
	let h = harness().await;
	let order = h.engine.create_order(request(1)).await.unwrap();

	let first = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert!(first.is_err());

	h.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await
		.unwrap();
	let replayed = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert_eq!(replayed, first);
	assert_eq!(h.ledger.updates(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callbacks_write_once() {
	let h = harness().await;
	let order = confirmed_order(&h).await;

	let mut handles = Vec::new();
	for _ in 0..8 {
		let engine = Arc::clone(&h.engine);
		let callback = update(order.order_id, OrderStatus::Settled);
		handles.push(tokio::spawn(async move {
			engine.update_order_status(callback).await
		}));
	}
	for handle in handles {
		assert_eq!(handle.await.unwrap(), Ok(()));
	}
	assert_eq!(h.ledger.updates(), 1);
}

#[tokio::test]
async fn test_failed_fulfillment_notifies_payment() {
	let h = harness().await;
	let order = confirmed_order(&h).await;

	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Rejected))
		.await
		.unwrap();

	let payment = h.payment.clone();
	eventually(move || !payment.failed().is_empty()).await;
	assert_eq!(
		h.payment.failed(),
		vec![(order.order_id, OrderStatus::Rejected)]
	);
	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn test_lock_timeout_is_not_recorded() {
	let h = harness_with(config("lock_timeout_secs = 1")).await;
	let order = confirmed_order(&h).await;

	let held = h
		.lock
		.try_acquire(&format!("order:{}", order.order_id), Duration::from_secs(1))
		.await
		.unwrap();

	let confirm = h
		.engine
		.confirm_order(confirmation(&order, OrderStatus::Confirmed))
		.await;
	assert!(matches!(confirm, Err(OrderError::LockTimeout(_))));
	let callback = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert!(matches!(callback, Err(OrderError::LockTimeout(_))));

	h.lock.release(&held).await.unwrap();

	// the retried callback runs for real
	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await
		.unwrap();
	assert_eq!(h.ledger.updates(), 1);
}

#[tokio::test]
async fn test_cache_miss_rebuilds_from_ledger() {
	let h = harness().await;
	let order = confirmed_order(&h).await;

	h.cache
		.delete(&format!("orders:{}", order.order_id))
		.await
		.unwrap();

	h.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await
		.unwrap();
	let record = h.ledger.find(order.order_id).await.unwrap();
	assert_eq!(record.status, OrderStatus::Settled);
	// the rebuilt snapshot was written back
	assert!(h
		.cache
		.exists(&format!("orders:{}", order.order_id))
		.await
		.unwrap());
}

#[tokio::test]
async fn test_cache_miss_without_reconciliation() {
	let h = harness_with(config("reconcile_on_cache_miss = false")).await;
	let order = confirmed_order(&h).await;

	h.cache
		.delete(&format!("orders:{}", order.order_id))
		.await
		.unwrap();

	let result = h
		.engine
		.update_order_status(update(order.order_id, OrderStatus::Settled))
		.await;
	assert_eq!(
		result,
		Err(OrderError::NotFound("order not found or expired".into()))
	);
	assert_eq!(h.ledger.updates(), 0);
}

#[tokio::test]
async fn test_bus_confirmations_drive_the_engine() {
	let (source, bus) = ChannelSource::new();
	let (builder, parts) = builder_parts(config(""));
	let engine = Arc::new(
		builder
			.with_confirmation_source(Box::new(source))
			.build()
			.await
			.unwrap(),
	);
	let h = parts.into_harness(engine);
	let mut events = h.engine.event_bus().subscribe();

	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
	let runner = {
		let engine = Arc::clone(&h.engine);
		tokio::spawn(async move {
			engine
				.run(async {
					let _ = stop_rx.await;
				})
				.await
		})
	};

	let order = h.engine.create_order(request(1)).await.unwrap();
	bus.send(confirmation(&order, OrderStatus::Confirmed))
		.unwrap();

	let confirmed = next_event(&mut events, |e| matches!(e, OrderEvent::Confirmed { .. })).await;
	assert_eq!(
		confirmed,
		OrderEvent::Confirmed {
			order_id: order.order_id
		}
	);
	assert_eq!(h.ledger.creates(), 1);

	stop_tx.send(()).unwrap();
	runner.await.unwrap().unwrap();
}

//! Provider routing and fulfillment dispatch.
//!
//! The [`ProviderRouter`] is built once from the catalog's provider list.
//! Providers are grouped by the supplier codes they serve; inside each pool
//! every provider owns a slice of the cumulative weight range, in
//! declaration order. An order's pinned draw picks the first provider whose
//! boundary is at or above it, so the same order always reaches the same
//! provider.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use topup_types::{EventBus, OrderEvent, OrderSnapshot, Provider};

pub mod target;

/// Re-export implementations
pub mod implementations {
	pub mod jsonrpc;
}

pub use target::{DispatchTarget, HttpTarget, RpcClient, RpcTarget};

use implementations::jsonrpc::JsonRpcClient;

#[derive(Debug, Error)]
pub enum DeliveryError {
	/// A provider is declared with a protocol the router cannot speak.
	#[error("Unsupported provider type '{provider_type}' for provider {provider}")]
	UnsupportedProviderType {
		provider: String,
		provider_type: String,
	},
	/// No provider serves the supplier, or the draw falls outside every slice.
	#[error("No provider available for supplier {0}")]
	NoProviderAvailable(String),
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Provider {provider} rejected the order with status {status}")]
	Rejected { provider: String, status: u16 },
	#[error("RPC error: {0}")]
	Rpc(String),
}

/// Builds the RPC stub for a provider.
pub type RpcClientFactory = dyn Fn(&Provider) -> Arc<dyn RpcClient> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
	Http,
	Rpc,
}

fn provider_kind(provider: &Provider) -> Result<ProviderKind, DeliveryError> {
	match provider.provider_type.to_ascii_lowercase().as_str() {
		"http" => Ok(ProviderKind::Http),
		"grpc" | "rpc" => Ok(ProviderKind::Rpc),
		_ => Err(DeliveryError::UnsupportedProviderType {
			provider: provider.code.clone(),
			provider_type: provider.provider_type.clone(),
		}),
	}
}

/// Weighted provider pools keyed by supplier code. Read-only once built.
pub struct ProviderRouter {
	pools: HashMap<String, Vec<DispatchTarget>>,
}

impl ProviderRouter {
	/// Builds the pools from the provider list.
	///
	/// Fails on the first provider with an unknown type. Providers with zero
	/// weight could never be selected and are skipped.
	pub fn build(
		providers: Vec<Provider>,
		callback_url: &str,
		http_client: reqwest::Client,
		rpc_factory: &RpcClientFactory,
	) -> Result<Self, DeliveryError> {
		let mut pools: HashMap<String, Vec<DispatchTarget>> = HashMap::new();

		for provider in &providers {
			let kind = provider_kind(provider)?;
			if provider.weight == 0 {
				tracing::warn!(provider = %provider.code, "Skipping provider with zero weight");
				continue;
			}

			let rpc_client = match kind {
				ProviderKind::Rpc => Some(rpc_factory(provider)),
				ProviderKind::Http => None,
			};

			for supplier in &provider.suppliers {
				let pool = pools.entry(supplier.clone()).or_default();
				let cumulative_weight = pool
					.last()
					.map(|t| t.cumulative_weight())
					.unwrap_or(0)
					.saturating_add(provider.weight);

				let target = match &rpc_client {
					Some(client) => DispatchTarget::Rpc(RpcTarget {
						code: provider.code.clone(),
						callback_url: callback_url.to_string(),
						cumulative_weight,
						client: client.clone(),
					}),
					None => DispatchTarget::Http(HttpTarget {
						code: provider.code.clone(),
						address: provider.address.clone(),
						callback_url: callback_url.to_string(),
						cumulative_weight,
						client: http_client.clone(),
					}),
				};
				pool.push(target);
			}
		}

		for (supplier, pool) in &pools {
			tracing::info!(
				supplier = %supplier,
				providers = pool.len(),
				total_weight = pool.last().map(|t| t.cumulative_weight()).unwrap_or(0),
				"Provider pool ready"
			);
		}

		Ok(Self { pools })
	}

	/// Builds the router with JSON-RPC stubs for RPC providers.
	pub fn with_json_rpc(
		providers: Vec<Provider>,
		callback_url: &str,
		http_client: reqwest::Client,
	) -> Result<Self, DeliveryError> {
		let rpc_http = http_client.clone();
		let factory = move |provider: &Provider| -> Arc<dyn RpcClient> {
			Arc::new(JsonRpcClient::new(provider.address.clone(), rpc_http.clone()))
		};
		Self::build(providers, callback_url, http_client, &factory)
	}

	/// Sum of weights in the supplier's pool. Zero for unknown suppliers.
	pub fn total_weight(&self, supplier_code: &str) -> u32 {
		self.pools
			.get(supplier_code)
			.and_then(|pool| pool.last())
			.map(|t| t.cumulative_weight())
			.unwrap_or(0)
	}

	/// Draws a uniform value in `[0, total)` for the supplier's pool.
	pub fn draw(&self, supplier_code: &str) -> u32 {
		let total = self.total_weight(supplier_code);
		if total == 0 {
			return 0;
		}
		rand::thread_rng().gen_range(0..total)
	}

	/// Returns the first target whose boundary is at or above `draw`.
	pub fn select(&self, supplier_code: &str, draw: u32) -> Result<&DispatchTarget, DeliveryError> {
		self.pools
			.get(supplier_code)
			.and_then(|pool| pool.iter().find(|t| t.cumulative_weight() >= draw))
			.ok_or_else(|| DeliveryError::NoProviderAvailable(supplier_code.to_string()))
	}

	/// Hands the order to its pinned provider in a detached task.
	///
	/// Only selection errors are returned. The outcome of the call itself is
	/// logged and published on `events`. Returns the chosen provider code.
	pub fn dispatch(&self, order: &OrderSnapshot, events: &EventBus) -> Result<String, DeliveryError> {
		let target = self
			.select(&order.supplier_code, order.random_provider_weight)?
			.clone();
		let provider_code = target.code().to_string();

		let _ = events.publish(OrderEvent::DispatchRequested {
			order_id: order.order_id,
			provider_code: provider_code.clone(),
		});

		let order = order.clone();
		let events = events.clone();
		tokio::spawn(async move {
			match target.dispatch(&order).await {
				Ok(()) => {
					tracing::info!(
						order_id = order.order_id,
						provider = %target.code(),
						"Order dispatched to provider"
					);
				}
				Err(e) => {
					tracing::error!(
						order_id = order.order_id,
						provider = %target.code(),
						error = %e,
						"Order dispatch failed"
					);
					let _ = events.publish(OrderEvent::DispatchFailed {
						order_id: order.order_id,
						reason: e.to_string(),
					});
				}
			}
		});

		Ok(provider_code)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
	use chrono::Utc;
	use std::sync::Mutex;
	use tokio::sync::mpsc;
	use topup_types::{OrderStatus, ProviderOrderRequest};

	#[derive(Default)]
	struct RecordingRpc {
		calls: Mutex<Vec<ProviderOrderRequest>>,
	}

	#[async_trait]
	impl RpcClient for RecordingRpc {
		async fn submit(&self, request: &ProviderOrderRequest) -> Result<(), DeliveryError> {
			self.calls.lock().unwrap().push(request.clone());
			Ok(())
		}
	}

	fn provider(code: &str, provider_type: &str, address: &str, weight: u32) -> Provider {
		Provider {
			code: code.into(),
			name: String::new(),
			provider_type: provider_type.into(),
			address: address.into(),
			weight,
			suppliers: vec!["VTL".into()],
		}
	}

	fn mixed_providers() -> Vec<Provider> {
		vec![
			provider("P-HTTP", "http", "http://127.0.0.1:1/orders", 30),
			provider("P-RPC", "grpc", "http://127.0.0.1:1/rpc", 70),
		]
	}

	fn order(draw: u32) -> OrderSnapshot {
		OrderSnapshot {
			order_id: 77,
			user_id: 1,
			sku_id: 1,
			supplier_code: "VTL".into(),
			phone_number: "081234567890".into(),
			price: 10000,
			total_price: 10000,
			cash_back_value: 500,
			status: OrderStatus::Confirmed,
			random_provider_weight: draw,
			created_at: Utc::now(),
		}
	}

	fn router_with(rpc: Arc<RecordingRpc>, providers: Vec<Provider>) -> ProviderRouter {
		let factory = move |_: &Provider| -> Arc<dyn RpcClient> { rpc.clone() };
		ProviderRouter::build(
			providers,
			"http://broker.local/v1/api/order/update-status",
			reqwest::Client::new(),
			&factory,
		)
		.unwrap()
	}

	#[test]
	fn test_cumulative_boundaries() {
		let router = router_with(Arc::default(), mixed_providers());
		let pool = &router.pools["VTL"];
		assert_eq!(pool[0].cumulative_weight(), 30);
		assert_eq!(pool[1].cumulative_weight(), 100);
		assert!(matches!(pool[0], DispatchTarget::Http(_)));
		assert!(matches!(pool[1], DispatchTarget::Rpc(_)));
		assert_eq!(router.total_weight("VTL"), 100);
		assert_eq!(router.total_weight("XL"), 0);
	}

	#[test]
	fn test_select_uses_first_boundary_at_or_above_draw() {
		let router = router_with(Arc::default(), mixed_providers());
		assert_eq!(router.select("VTL", 0).unwrap().code(), "P-HTTP");
		assert_eq!(router.select("VTL", 30).unwrap().code(), "P-HTTP");
		assert_eq!(router.select("VTL", 31).unwrap().code(), "P-RPC");
		assert_eq!(router.select("VTL", 100).unwrap().code(), "P-RPC");
		assert!(matches!(
			router.select("VTL", 101),
			Err(DeliveryError::NoProviderAvailable(_))
		));
		assert!(matches!(
			router.select("XL", 0),
			Err(DeliveryError::NoProviderAvailable(s)) if s == "XL"
		));
	}

	#[test]
	fn test_pinned_draw_is_stable() {
		let router = router_with(Arc::default(), mixed_providers());
		let draw = router.draw("VTL");
		let first = router.select("VTL", draw).unwrap().code().to_string();
		for _ in 0..50 {
			assert_eq!(router.select("VTL", draw).unwrap().code(), first);
		}
	}

	#[test]
	fn test_weights_converge() {
		let router = router_with(Arc::default(), mixed_providers());
		let samples = 20_000;
		let http = (0..samples)
			.filter(|_| {
				let draw = router.draw("VTL");
				assert!(draw < 100);
				router.select("VTL", draw).unwrap().code() == "P-HTTP"
			})
			.count();

		let share = http as f64 / samples as f64;
		assert!((0.27..0.35).contains(&share), "http share was {}", share);
	}

	#[test]
	fn test_unknown_type_fails_build() {
		let factory = |_: &Provider| -> Arc<dyn RpcClient> { Arc::new(RecordingRpc::default()) };
		let result = ProviderRouter::build(
			vec![provider("P-SOAP", "soap", "http://x", 10)],
			"http://cb",
			reqwest::Client::new(),
			&factory,
		);
		assert!(matches!(
			result,
			Err(DeliveryError::UnsupportedProviderType { provider, .. }) if provider == "P-SOAP"
		));
	}

	#[test]
	fn test_zero_weight_provider_is_skipped() {
		let router = router_with(
			Arc::default(),
			vec![
				provider("P-OFF", "http", "http://x", 0),
				provider("P-ON", "http", "http://y", 10),
			],
		);
		assert_eq!(router.select("VTL", 0).unwrap().code(), "P-ON");
		assert_eq!(router.pools["VTL"].len(), 1);
	}

	#[tokio::test]
	async fn test_rpc_dispatch_sends_provider_payload() {
		let rpc = Arc::new(RecordingRpc::default());
		let router = router_with(rpc.clone(), mixed_providers());
		let events = EventBus::new(16);
		let mut rx = events.subscribe();

		let code = router.dispatch(&order(80), &events).unwrap();
		assert_eq!(code, "P-RPC");
		assert_eq!(
			rx.recv().await.unwrap(),
			OrderEvent::DispatchRequested {
				order_id: 77,
				provider_code: "P-RPC".into()
			}
		);

		tokio::time::timeout(std::time::Duration::from_secs(1), async {
			while rpc.calls.lock().unwrap().is_empty() {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
		let calls = rpc.calls.lock().unwrap();
		assert_eq!(calls[0].order_id, 77);
		assert_eq!(calls[0].price, 10000);
		assert_eq!(
			calls[0].callback_url,
			"http://broker.local/v1/api/order/update-status"
		);
	}

	async fn spawn_provider(status: StatusCode) -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let app = Router::new()
			.route(
				"/orders",
				post(
					move |State(tx): State<mpsc::UnboundedSender<serde_json::Value>>,
					      Json(body): Json<serde_json::Value>| async move {
						let _ = tx.send(body);
						status
					},
				),
			)
			.with_state(tx);

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		(format!("http://{}/orders", addr), rx)
	}

	#[tokio::test]
	async fn test_http_dispatch_posts_json() {
		let (address, mut received) = spawn_provider(StatusCode::OK).await;
		let router = router_with(
			Arc::default(),
			vec![provider("P-HTTP", "http", &address, 30)],
		);

		let events = EventBus::new(16);
		router.dispatch(&order(5), &events).unwrap();

		let body = received.recv().await.unwrap();
		assert_eq!(body["order_id"], 77);
		assert_eq!(body["phone_number"], "081234567890");
		assert_eq!(body["total_price"], 10000);
		assert_eq!(body["price"], 10000);
		assert!(body.get("random_provider_weight").is_none());
	}

	#[tokio::test]
	async fn test_http_rejection_publishes_failure() {
		let (address, _received) = spawn_provider(StatusCode::SERVICE_UNAVAILABLE).await;
		let router = router_with(
			Arc::default(),
			vec![provider("P-HTTP", "http", &address, 30)],
		);

		let events = EventBus::new(16);
		let mut rx = events.subscribe();
		router.dispatch(&order(5), &events).unwrap();

		assert!(matches!(
			rx.recv().await.unwrap(),
			OrderEvent::DispatchRequested { .. }
		));
		match rx.recv().await.unwrap() {
			OrderEvent::DispatchFailed { order_id, reason } => {
				assert_eq!(order_id, 77);
				assert!(reason.contains("503"));
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}
}

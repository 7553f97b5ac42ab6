//! JSON-RPC 2.0 client for RPC providers.
//!
//! Providers expose a single `order.submit` method taking the fulfillment
//! request as its params object.

use crate::{DeliveryError, RpcClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use topup_types::ProviderOrderRequest;

const SUBMIT_METHOD: &str = "order.submit";

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
	#[serde(default)]
	error: Option<RpcErrorObject>,
}

pub struct JsonRpcClient {
	endpoint: String,
	client: reqwest::Client,
	next_id: AtomicU64,
}

impl JsonRpcClient {
	pub fn new(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
		Self {
			endpoint: endpoint.into(),
			client,
			next_id: AtomicU64::new(1),
		}
	}
}

#[async_trait]
impl RpcClient for JsonRpcClient {
	async fn submit(&self, request: &ProviderOrderRequest) -> Result<(), DeliveryError> {
		let body = json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": SUBMIT_METHOD,
			"params": request,
		});

		let response = self
			.client
			.post(&self.endpoint)
			.json(&body)
			.send()
			.await
			.map_err(|e| DeliveryError::Transport(format!("{}: {}", self.endpoint, e)))?;

		if !response.status().is_success() {
			return Err(DeliveryError::Rejected {
				provider: self.endpoint.clone(),
				status: response.status().as_u16(),
			});
		}

		let reply: RpcResponse = response
			.json()
			.await
			.map_err(|e| DeliveryError::Rpc(format!("malformed reply: {}", e)))?;

		match reply.error {
			Some(error) => Err(DeliveryError::Rpc(format!(
				"{} ({})",
				error.message, error.code
			))),
			None => Ok(()),
		}
	}
}

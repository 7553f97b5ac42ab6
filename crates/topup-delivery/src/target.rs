//! Fulfillment targets.
//!
//! A target is one provider inside one supplier's pool. It knows its
//! cumulative weight boundary in that pool and how to hand an order to the
//! provider.

use crate::DeliveryError;
use async_trait::async_trait;
use std::sync::Arc;
use topup_types::{OrderSnapshot, ProviderOrderRequest};

/// Client stub for providers reached over RPC.
#[async_trait]
pub trait RpcClient: Send + Sync {
	/// Submits a fulfillment request. Returns once the provider accepted it.
	async fn submit(&self, request: &ProviderOrderRequest) -> Result<(), DeliveryError>;
}

/// Provider reached by POSTing the order as JSON.
#[derive(Clone)]
pub struct HttpTarget {
	pub code: String,
	pub address: String,
	pub callback_url: String,
	pub cumulative_weight: u32,
	pub client: reqwest::Client,
}

impl HttpTarget {
	async fn dispatch(&self, order: &OrderSnapshot) -> Result<(), DeliveryError> {
		let payload = ProviderOrderRequest::from_snapshot(order, &self.callback_url);
		let response = self
			.client
			.post(&self.address)
			.json(&payload)
			.send()
			.await
			.map_err(|e| DeliveryError::Transport(format!("{}: {}", self.code, e)))?;

		if !response.status().is_success() {
			return Err(DeliveryError::Rejected {
				provider: self.code.clone(),
				status: response.status().as_u16(),
			});
		}
		Ok(())
	}
}

/// Provider reached through an [`RpcClient`].
#[derive(Clone)]
pub struct RpcTarget {
	pub code: String,
	pub callback_url: String,
	pub cumulative_weight: u32,
	pub client: Arc<dyn RpcClient>,
}

impl RpcTarget {
	async fn dispatch(&self, order: &OrderSnapshot) -> Result<(), DeliveryError> {
		let payload = ProviderOrderRequest::from_snapshot(order, &self.callback_url);
		self.client.submit(&payload).await
	}
}

#[derive(Clone)]
pub enum DispatchTarget {
	Http(HttpTarget),
	Rpc(RpcTarget),
}

impl DispatchTarget {
	pub fn code(&self) -> &str {
		match self {
			DispatchTarget::Http(target) => &target.code,
			DispatchTarget::Rpc(target) => &target.code,
		}
	}

	/// Upper boundary of this target's slice of the pool's weight range.
	pub fn cumulative_weight(&self) -> u32 {
		match self {
			DispatchTarget::Http(target) => target.cumulative_weight,
			DispatchTarget::Rpc(target) => target.cumulative_weight,
		}
	}

	pub async fn dispatch(&self, order: &OrderSnapshot) -> Result<(), DeliveryError> {
		match self {
			DispatchTarget::Http(target) => target.dispatch(order).await,
			DispatchTarget::Rpc(target) => target.dispatch(order).await,
		}
	}
}

impl std::fmt::Debug for DispatchTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let kind = match self {
			DispatchTarget::Http(_) => "http",
			DispatchTarget::Rpc(_) => "rpc",
		};
		f.debug_struct("DispatchTarget")
			.field("kind", &kind)
			.field("code", &self.code())
			.field("cumulative_weight", &self.cumulative_weight())
			.finish()
	}
}

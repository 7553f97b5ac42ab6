//! HTTP notifier.
//!
//! New orders are POSTed as JSON to `create_url`. Failures are sent as a
//! PATCH of `{ order_id, status }` to `update_url`.

use crate::{PaymentError, PaymentInterface};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use topup_types::{
	ConfigSchema, Field, FieldType, OrderId, OrderResponse, OrderSnapshot, OrderStatus, Schema,
	ValidationError,
};

#[derive(Debug, Serialize)]
struct StatusUpdate {
	order_id: OrderId,
	status: OrderStatus,
}

pub struct HttpPayment {
	client: reqwest::Client,
	create_url: String,
	update_url: String,
}

impl HttpPayment {
	pub fn new(client: reqwest::Client, create_url: String, update_url: String) -> Self {
		Self {
			client,
			create_url,
			update_url,
		}
	}
}

fn check(response: reqwest::Response) -> Result<(), PaymentError> {
	if response.status().is_success() {
		Ok(())
	} else {
		Err(PaymentError::Rejected(response.status().as_u16()))
	}
}

#[async_trait]
impl PaymentInterface for HttpPayment {
	async fn order_created(&self, order: &OrderSnapshot) -> Result<(), PaymentError> {
		let response = self
			.client
			.post(&self.create_url)
			.json(&OrderResponse::from(order))
			.send()
			.await
			.map_err(|e| PaymentError::Transport(e.to_string()))?;
		check(response)
	}

	async fn order_failed(&self, order_id: OrderId, status: OrderStatus) -> Result<(), PaymentError> {
		let response = self
			.client
			.patch(&self.update_url)
			.json(&StatusUpdate { order_id, status })
			.send()
			.await
			.map_err(|e| PaymentError::Transport(e.to_string()))?;
		check(response)
	}
}

pub struct HttpPaymentSchema;

impl ConfigSchema for HttpPaymentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("create_url", FieldType::String),
				Field::new("update_url", FieldType::String),
			],
			vec![Field::new(
				"timeout_ms",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

/// Factory function to create an HTTP payment notifier from configuration.
///
/// Configuration parameters:
/// - `create_url`: endpoint receiving new pending orders
/// - `update_url`: endpoint receiving failed order statuses
/// - `timeout_ms`: request timeout (default: 5000)
pub fn create_payment(config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	let url = |name: &str| {
		config
			.get(name)
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.ok_or_else(|| PaymentError::Configuration(format!("{} is required", name)))
	};
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(5000) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_millis(timeout_ms))
		.build()
		.map_err(|e| PaymentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

	Ok(Box::new(HttpPayment::new(
		client,
		url("create_url")?,
		url("update_url")?,
	)))
}

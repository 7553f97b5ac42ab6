use crate::{PaymentError, PaymentInterface};
use async_trait::async_trait;
use topup_types::{ConfigSchema, OrderId, OrderSnapshot, OrderStatus, Schema, ValidationError};

/// Drops every notification. Used when no payment subsystem is wired in.
pub struct NoopPayment;

#[async_trait]
impl PaymentInterface for NoopPayment {
	async fn order_created(&self, order: &OrderSnapshot) -> Result<(), PaymentError> {
		tracing::debug!(order_id = order.order_id, "Skipping pending order notification");
		Ok(())
	}

	async fn order_failed(&self, order_id: OrderId, _status: OrderStatus) -> Result<(), PaymentError> {
		tracing::debug!(order_id, "Skipping failed order notification");
		Ok(())
	}
}

pub struct NoopPaymentSchema;

impl ConfigSchema for NoopPaymentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_payment(_config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	Ok(Box::new(NoopPayment))
}

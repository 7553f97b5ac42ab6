//! Lifecycle events and the broadcast bus that carries them.
//!
//! Events are informational: publishing never fails an operation, and a bus
//! without subscribers simply drops them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{OrderId, OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
	Created {
		order_id: OrderId,
		supplier_code: String,
	},
	Confirmed {
		order_id: OrderId,
	},
	Settled {
		order_id: OrderId,
	},
	Rejected {
		order_id: OrderId,
		previous: OrderStatus,
	},
	DispatchRequested {
		order_id: OrderId,
		provider_code: String,
	},
	DispatchFailed {
		order_id: OrderId,
		reason: String,
	},
}

/// Event bus for broadcasting order events to multiple subscribers.
pub struct EventBus {
	sender: broadcast::Sender<OrderEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	///
	/// Slow subscribers lose the oldest events once `capacity` is exceeded.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error if there are no active subscribers.
	pub fn publish(&self, event: OrderEvent) -> Result<(), broadcast::error::SendError<OrderEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

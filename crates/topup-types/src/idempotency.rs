//! Recorded outcome of a processed fulfillment callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, OrderError};

/// Verdict of a previously processed callback, replayed on redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyVerdict {
	pub success: bool,
	pub error_kind: Option<ErrorKind>,
	pub error_message: Option<String>,
	pub recorded_at: DateTime<Utc>,
}

impl IdempotencyVerdict {
	pub fn from_result(result: &Result<(), OrderError>) -> Self {
		match result {
			Ok(()) => Self {
				success: true,
				error_kind: None,
				error_message: None,
				recorded_at: Utc::now(),
			},
			Err(e) => Self {
				success: false,
				error_kind: Some(e.kind()),
				error_message: Some(e.message().to_string()),
				recorded_at: Utc::now(),
			},
		}
	}

	/// Replays the verdict as the result originally returned.
	pub fn replay(&self) -> Result<(), OrderError> {
		if self.success {
			return Ok(());
		}

		Err(OrderError::from_parts(
			self.error_kind.unwrap_or(ErrorKind::Infra),
			self.error_message.clone().unwrap_or_default(),
		))
	}
}

//! Order identifiers.
//!
//! An id is the creation time in unix milliseconds shifted left by 22 bits,
//! with 22 random bits below. Ids sort by creation time; two orders created
//! in the same millisecond collide with probability 2^-22, and the engine
//! retries creation on the rare collision.

use chrono::Utc;
use rand::Rng;
use topup_types::OrderId;

const RANDOM_BITS: u32 = 22;

pub fn next_order_id() -> OrderId {
	let millis = Utc::now().timestamp_millis().max(0) as u64;
	let random: u64 = rand::thread_rng().gen_range(0..(1u64 << RANDOM_BITS));
	(millis << RANDOM_BITS) | random
}

/// Creation time encoded in an id, in unix milliseconds.
pub fn created_millis(order_id: OrderId) -> u64 {
	order_id >> RANDOM_BITS
}

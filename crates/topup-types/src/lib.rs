//! Shared domain types for the top-up order broker.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! order snapshots and the payloads that drive their lifecycle, catalog
//! entries, ledger rows, idempotency verdicts, lifecycle events and the
//! error taxonomy returned by the order engine.

pub mod catalog;
pub mod errors;
pub mod events;
pub mod idempotency;
pub mod ledger;
pub mod order;
pub mod validation;

pub use catalog::*;
pub use errors::*;
pub use events::*;
pub use idempotency::*;
pub use ledger::*;
pub use order::*;
pub use validation::*;

//! Batched mutations
//!
//! Sets and deletes are applied to the engine immediately and queued with
//! their outcome. One durability commit per batch makes them crash-safe,
//! after which each request's callback fires exactly once, in the order
//! the requests were submitted.

mod errors;
mod queue;
mod request;

pub use errors::{QueueError, QueueResult};
pub use queue::{BatchState, CommitReport, MutationQueue};
pub use request::{
    Completion, DeleteCallback, MutationRequest, MutationResult, MutationStatus, SetCallback,
};

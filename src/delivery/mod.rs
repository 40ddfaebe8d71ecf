//! Clip delivery.
//!
//! ```text
//! ClipExtractor → stage → enqueue → output dir → sweep → Collector → ack
//! ```
//!
//! 1. **Store**: the durable queue (`ClipQueue`), backed by a directory
//! 2. **Sweeper**: periodic, self-excluding upload passes over the queue

pub mod store;
pub mod sweeper;

// Re-export key types
pub use store::{ClipQueue, DirectoryQueue, QueueError};
pub use sweeper::{DeliveryQueue, SweepOutcome};

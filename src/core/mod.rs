//! Core capture → extract → deliver logic.
//!
//! This module contains:
//! - ChannelRecorder: keeps the per-channel capture process alive
//! - ClipExtractor: cuts clips out of the ring buffer
//! - TriggerGateway: cool-down filter and extraction scheduling
//! - RetryPolicy: fixed-delay retry shared by the long-running loops

pub mod extractor;
pub mod gateway;
pub mod recorder;
pub mod retry;

// Re-export commonly used types
pub use extractor::{select_recent, ClipExtractor, ExtractError, ExtractSettings};
pub use gateway::{TriggerGateway, TriggerOutcome};
pub use recorder::{ChannelRecorder, SupervisionSummary};
pub use retry::RetryPolicy;

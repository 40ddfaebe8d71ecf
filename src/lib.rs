//! replayd - Instant-replay daemon for camera kiosks
//!
//! Records every configured camera channel into a small on-disk ring
//! buffer, cuts a short MP4 replay when a channel is triggered, and
//! delivers queued replays to a remote collector.
//!
//! # Architecture
//!
//! The outbox directory is the only state shared between cutting and
//! delivery:
//! - Recorders keep the newest few segments per channel on disk
//! - A trigger cuts the tail of those segments into a clip and queues it
//! - A periodic sweep uploads queued clips and deletes each one only
//!   after the collector acknowledges it
//!
//! # Modules
//!
//! - `adapters`: External processes and services (ffmpeg, collector)
//! - `core`: Recording, extraction, and trigger handling
//! - `delivery`: Durable clip queue and the upload sweeper
//! - `domain`: Data structures (Channel, Segment, Clip)
//! - `cli`: Command-line interface and the daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon; type a channel id to trigger a replay
//! replayd run
//!
//! # Cut a replay by hand and deliver it
//! replayd trigger 9
//! replayd sweep
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod delivery;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{ChannelRecorder, ClipExtractor, RetryPolicy, TriggerGateway, TriggerOutcome};
pub use delivery::{ClipQueue, DeliveryQueue, DirectoryQueue, SweepOutcome};
pub use domain::{Channel, Clip, ClipRecord, Segment, StreamSource};

pub use adapters::{CollectorClient, CollectorConfig, Ffmpeg};

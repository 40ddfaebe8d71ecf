//! Domain types for replayd.
//!
//! - Channel: a monitored stream and its ring-buffer layout
//! - Segment: one file of a channel's ring buffer
//! - Clip: an extracted replay waiting for delivery

pub mod channel;
pub mod clip;
pub mod segment;

// Re-export commonly used types
pub use channel::{buffer_dir_for, Channel, StreamSource};
pub use clip::{Clip, ClipRecord, UNKNOWN_CHANNEL};
pub use segment::{list_segments, Segment};

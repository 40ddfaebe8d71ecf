//! Adapter interfaces for external systems.
//!
//! Adapters wrap the two collaborators that live outside the process:
//! the media engine (ffmpeg) and the remote collector that receives clips.

pub mod collector;
pub mod ffmpeg;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Clip;

pub use collector::{CollectorClient, CollectorConfig};
pub use ffmpeg::{CaptureCommand, Ffmpeg};

/// Concatenates segments listed in a manifest and keeps the trailing window
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    /// Human-readable encoder name
    fn name(&self) -> &str;

    /// Write the last `window` of the concatenated manifest inputs to `output`.
    ///
    /// `manifest` is a concat list with one `file '<path>'` line per input,
    /// in chronological order.
    async fn concat_trim(&self, manifest: &Path, window: Duration, output: &Path) -> Result<()>;
}

/// Acknowledgment returned by the collector for an accepted upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectorAck {
    pub message: String,
}

/// Receives finished clips
#[async_trait]
pub trait Collector: Send + Sync {
    /// Human-readable collector name
    fn name(&self) -> &str;

    /// Upload one clip; Ok only on a well-formed acknowledgment
    async fn upload(&self, clip: &Clip) -> Result<CollectorAck>;
}

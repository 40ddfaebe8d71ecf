//! Replay clip extraction.
//!
//! A clip is the trailing window of the newest few segments of a channel's
//! ring buffer, concatenated in chronological order. The window ends at the
//! end of whatever the buffer holds when extraction runs, not exactly at the
//! trigger instant.
//!
//! The capture process keeps rewriting the newest segment while we read it.
//! There is no locking between the two: the last segment of a clip may be
//! truncated or freshly restarted, and that is tolerated.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::ffmpeg::concat_manifest;
use crate::adapters::ClipEncoder;
use crate::delivery::{ClipQueue, QueueError};
use crate::domain::{list_segments, Channel, Clip, Segment};

/// Errors that can occur while extracting a clip
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Channel {0} is not configured")]
    UnknownChannel(u32),

    #[error("No recordings available yet for channel {0}")]
    NoRecordingsAvailable(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoder failed: {0}")]
    Encoder(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Extraction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSettings {
    /// How many of the newest segments to concatenate (K)
    pub segment_count: usize,

    /// Length of the trailing window kept from the concatenation (W)
    pub window: Duration,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            segment_count: 3,
            window: Duration::from_secs(30),
        }
    }
}

/// Cuts clips out of channel ring buffers and hands them to the clip queue
pub struct ClipExtractor {
    channels: HashMap<u32, Channel>,
    encoder: Arc<dyn ClipEncoder>,
    queue: Arc<dyn ClipQueue>,
    settings: ExtractSettings,
}

impl ClipExtractor {
    pub fn new(
        channels: impl IntoIterator<Item = Channel>,
        encoder: Arc<dyn ClipEncoder>,
        queue: Arc<dyn ClipQueue>,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id, c)).collect(),
            encoder,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> ExtractSettings {
        self.settings
    }

    pub fn has_channel(&self, channel_id: u32) -> bool {
        self.channels.contains_key(&channel_id)
    }

    /// Extract a clip for a trigger on `channel_id` and enqueue it for delivery
    #[instrument(skip(self), fields(channel = channel_id))]
    pub async fn extract(
        &self,
        channel_id: u32,
        trigger_time: DateTime<Utc>,
    ) -> Result<Clip, ExtractError> {
        let channel = self
            .channels
            .get(&channel_id)
            .ok_or(ExtractError::UnknownChannel(channel_id))?;

        let segments = list_segments(&channel.buffer_dir).await?;
        let selected = select_recent(segments, self.settings.segment_count);
        if selected.is_empty() {
            return Err(ExtractError::NoRecordingsAvailable(channel_id));
        }
        if selected.len() < self.settings.segment_count {
            debug!(
                available = selected.len(),
                wanted = self.settings.segment_count,
                "Fewer segments than requested; clip may be shorter"
            );
        }

        let inputs: Vec<PathBuf> = selected.into_iter().map(|s| s.path).collect();

        // Clip identity is fixed up front; the queue decides where it lives
        let identity = Clip::new(channel_id, trigger_time, Path::new(""));
        let millis = identity.created_at.timestamp_millis();
        let manifest = channel.buffer_dir.join(format!("list_{}.txt", millis));
        let staged = self.queue.stage(&identity.file_name()).await?;

        let rendered = self.render(&manifest, &inputs, &staged).await;

        // The manifest never outlives the extraction
        if let Err(e) = tokio::fs::remove_file(&manifest).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove manifest {}: {}", manifest.display(), e);
            }
        }

        let published = match rendered {
            Ok(()) => self.queue.enqueue(&staged, identity.record()).await,
            Err(e) => {
                self.discard(&staged).await;
                return Err(e);
            }
        };

        match published {
            Ok(clip) => {
                info!(clip = %clip.path.display(), segments = inputs.len(), "Clip extracted and queued");
                Ok(clip)
            }
            Err(e) => {
                self.discard(&staged).await;
                Err(e.into())
            }
        }
    }

    async fn render(
        &self,
        manifest: &Path,
        inputs: &[PathBuf],
        staged: &Path,
    ) -> Result<(), ExtractError> {
        tokio::fs::write(manifest, concat_manifest(inputs)).await?;

        self.encoder
            .concat_trim(manifest, self.settings.window, staged)
            .await
            .map_err(|e| ExtractError::Encoder(format!("{:#}", e)))
    }

    async fn discard(&self, staged: &Path) {
        if let Err(e) = self.queue.discard(staged).await {
            warn!("Failed to discard staged clip {}: {}", staged.display(), e);
        }
    }
}

/// Newest `count` segments by modification time, returned oldest first
pub fn select_recent(mut segments: Vec<Segment>, count: usize) -> Vec<Segment> {
    segments.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    segments.truncate(count);
    segments.reverse();
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn segment(index: u32, age_secs: u64) -> Segment {
        Segment {
            index: Some(index),
            path: PathBuf::from(format!("/buffer/cam9/chunk_{:03}.ts", index)),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(10_000 - age_secs),
        }
    }

    #[test]
    fn test_select_recent_after_wrap() {
        // Ring of 4 wrapped: index 1 is newest, index 2 is oldest
        let segments = vec![segment(0, 45), segment(1, 0), segment(2, 135), segment(3, 90)];

        let selected = select_recent(segments, 3);
        let order: Vec<u32> = selected.iter().map(|s| s.index.unwrap()).collect();

        assert_eq!(order, vec![3, 0, 1]);
    }

    #[test]
    fn test_select_recent_with_fewer_than_requested() {
        let selected = select_recent(vec![segment(0, 10), segment(1, 0)], 3);
        let order: Vec<u32> = selected.iter().map(|s| s.index.unwrap()).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_select_recent_empty() {
        assert!(select_recent(Vec::new(), 3).is_empty());
    }
}

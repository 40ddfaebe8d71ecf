//! Durable clip queue.
//!
//! The default store is the output directory itself: every `.mp4` in the
//! root is a pending clip, so a restart re-derives the queue by listing the
//! directory. New clips are written under `.staging/` and renamed into the
//! root once complete, so a sweep never sees a half-written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::clip::{record_path_for, CLIP_EXTENSION, RECORD_EXTENSION};
use crate::domain::{Clip, ClipRecord};

/// Name of the staging directory inside the queue root
pub const STAGING_DIR: &str = ".staging";

/// Minimum age before `recover` treats a staged file or sidecar as abandoned
pub const RECOVERY_GRACE: Duration = Duration::from_secs(600);

/// Errors that can occur with the clip queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Staged clip not found: {0}")]
    NotStaged(PathBuf),
}

/// Durable queue of clips awaiting delivery
#[async_trait]
pub trait ClipQueue: Send + Sync {
    /// Where a new clip with this file name should be written before enqueueing
    async fn stage(&self, file_name: &str) -> Result<PathBuf, QueueError>;

    /// Publish a fully written staged clip
    async fn enqueue(&self, staged: &Path, record: ClipRecord) -> Result<Clip, QueueError>;

    /// Pending clips, oldest first
    async fn list_pending(&self) -> Result<Vec<Clip>, QueueError>;

    /// Remove a delivered clip (idempotent)
    async fn ack(&self, clip: &Clip) -> Result<(), QueueError>;

    /// Drop a staged file that will never be enqueued
    async fn discard(&self, staged: &Path) -> Result<(), QueueError>;
}

/// Directory-backed clip queue
#[derive(Debug, Clone)]
pub struct DirectoryQueue {
    root: PathBuf,
}

impl DirectoryQueue {
    /// Create a queue over an existing directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the directory if needed and return the queue
    pub async fn open(root: PathBuf) -> Result<Self, QueueError> {
        fs::create_dir_all(&root).await?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Remove leftovers of extractions interrupted by a crash: staged files
    /// and sidecars whose clip never got published.
    ///
    /// Only files untouched for `RECOVERY_GRACE` are removed, so a
    /// `replayd trigger` still encoding next to a starting daemon survives.
    pub async fn recover(&self) -> Result<usize, QueueError> {
        self.recover_older_than(RECOVERY_GRACE).await
    }

    /// Like `recover`, with an explicit minimum age for removal
    pub async fn recover_older_than(&self, grace: Duration) -> Result<usize, QueueError> {
        let mut removed = 0;

        let staging = self.staging_dir();
        if let Ok(mut entries) = fs::read_dir(&staging).await {
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if is_stale(&path, grace).await && remove_if_exists(&path).await? {
                    removed += 1;
                }
            }
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_extension(&path, RECORD_EXTENSION) {
                continue;
            }
            // `<clip>.mp4.json` -> `<clip>.mp4`
            let clip_path = path.with_extension("");
            if !fs::try_exists(&clip_path).await.unwrap_or(true)
                && is_stale(&path, grace).await
                && remove_if_exists(&path).await?
            {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root.display(), "Removed interrupted clip leftovers");
        }
        Ok(removed)
    }

    async fn read_record(&self, clip_path: &Path) -> Option<ClipRecord> {
        let record_path = record_path_for(clip_path);
        let content = match fs::read_to_string(&record_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read clip record {}: {}", record_path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<ClipRecord>(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring malformed clip record {}: {}", record_path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl ClipQueue for DirectoryQueue {
    async fn stage(&self, file_name: &str) -> Result<PathBuf, QueueError> {
        let staging = self.staging_dir();
        fs::create_dir_all(&staging).await?;
        Ok(staging.join(file_name))
    }

    async fn enqueue(&self, staged: &Path, record: ClipRecord) -> Result<Clip, QueueError> {
        if !fs::try_exists(staged).await? {
            return Err(QueueError::NotStaged(staged.to_path_buf()));
        }

        let clip = Clip::from_record(record, &self.root);
        let record_path = clip.record_path();

        // Record first: the clip must never be visible without it
        let json = serde_json::to_string(&clip.record())?;
        fs::write(&record_path, json).await?;

        if let Err(e) = fs::rename(staged, &clip.path).await {
            let _ = remove_if_exists(&record_path).await;
            return Err(e.into());
        }

        debug!(clip = %clip.path.display(), "Clip enqueued");
        Ok(clip)
    }

    async fn list_pending(&self) -> Result<Vec<Clip>, QueueError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_extension(&path, CLIP_EXTENSION) {
                continue;
            }

            let metadata = match fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let clip = match self.read_record(&path).await {
                Some(record) => Clip {
                    channel_id: record.channel_id,
                    created_at: record.created_at,
                    path,
                },
                None => {
                    let modified: DateTime<Utc> = metadata
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    Clip::from_path(path, modified)
                }
            };
            pending.push(clip);
        }

        // Sort by creation time (oldest first), file name as tie-break
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok(pending)
    }

    async fn ack(&self, clip: &Clip) -> Result<(), QueueError> {
        remove_if_exists(&clip.path).await?;
        remove_if_exists(&clip.record_path()).await?;
        Ok(())
    }

    async fn discard(&self, staged: &Path) -> Result<(), QueueError> {
        remove_if_exists(staged).await?;
        Ok(())
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Whether a file was last modified at least `grace` ago; vanished files are not
async fn is_stale(path: &Path, grace: Duration) -> bool {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .map(|age| age >= grace)
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Remove a file, treating "already gone" as success
async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

//! Extracted replay clips and their queue records.
//!
//! Clip files are named `replay_cam<channel>_<epochMillis>.mp4`. The name
//! alone is enough to recover the channel, but the extractor also writes a
//! [`ClipRecord`] sidecar so the delivery side never has to guess.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Extension of finished clips
pub const CLIP_EXTENSION: &str = "mp4";

/// Extension appended to a clip file name for its sidecar record
pub const RECORD_EXTENSION: &str = "json";

/// Channel id used when a clip's channel cannot be recovered
pub const UNKNOWN_CHANNEL: u32 = 0;

const CLIP_PREFIX: &str = "replay_cam";

/// Structured queue-entry record stored next to each clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub channel_id: u32,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
}

/// A finished clip, either just extracted or pending delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    /// Channel the clip was cut from
    pub channel_id: u32,

    /// Trigger time, millisecond precision
    pub created_at: DateTime<Utc>,

    /// Location of the clip file
    pub path: PathBuf,
}

impl Clip {
    /// Build the clip that a trigger at `created_at` produces in `dir`
    pub fn new(channel_id: u32, created_at: DateTime<Utc>, dir: &Path) -> Self {
        let created_at = truncate_to_millis(created_at);
        Self {
            channel_id,
            created_at,
            path: dir.join(clip_file_name(channel_id, created_at)),
        }
    }

    /// Rebuild a clip from its sidecar record
    pub fn from_record(record: ClipRecord, dir: &Path) -> Self {
        Self {
            channel_id: record.channel_id,
            created_at: record.created_at,
            path: dir.join(record.file_name),
        }
    }

    /// Recover a clip from its file name alone.
    ///
    /// A name without a parsable channel falls back to [`UNKNOWN_CHANNEL`];
    /// a name without a timestamp uses `fallback_time` (typically the mtime).
    pub fn from_path(path: PathBuf, fallback_time: DateTime<Utc>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let channel_id = parse_channel_id(&name).unwrap_or(UNKNOWN_CHANNEL);
        let created_at = parse_created_at(&name).unwrap_or(fallback_time);

        Self {
            channel_id,
            created_at,
            path,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn record(&self) -> ClipRecord {
        ClipRecord {
            channel_id: self.channel_id,
            created_at: self.created_at,
            file_name: self.file_name(),
        }
    }

    /// Path of the sidecar record (`<clip>.mp4.json`)
    pub fn record_path(&self) -> PathBuf {
        record_path_for(&self.path)
    }
}

/// `replay_cam<channel>_<epochMillis>.mp4`
pub fn clip_file_name(channel_id: u32, created_at: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}.{}",
        CLIP_PREFIX,
        channel_id,
        created_at.timestamp_millis(),
        CLIP_EXTENSION
    )
}

/// Sidecar path for a clip file
pub fn record_path_for(clip_path: &Path) -> PathBuf {
    let mut name = clip_path.as_os_str().to_os_string();
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}

/// Extract the channel id from any name containing `cam<digits>_`
pub fn parse_channel_id(file_name: &str) -> Option<u32> {
    let mut rest = file_name;
    while let Some(pos) = rest.find("cam") {
        let after = &rest[pos + 3..];
        let digits: &str = &after[..after
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after.len())];

        if !digits.is_empty() && after[digits.len()..].starts_with('_') {
            if let Ok(id) = digits.parse() {
                return Some(id);
            }
        }
        rest = after;
    }
    None
}

/// Extract the epoch-millisecond timestamp from a canonical clip name
pub fn parse_created_at(file_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name
        .strip_prefix(CLIP_PREFIX)?
        .strip_suffix(&format!(".{}", CLIP_EXTENSION))?;
    let (_, millis) = stem.split_once('_')?;
    let millis: i64 = millis.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis())
        .single()
        .unwrap_or(t)
}

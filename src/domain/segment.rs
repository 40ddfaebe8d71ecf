//! Ring-buffer segments written by the capture process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

/// Extension of segment files in a channel's buffer directory
pub const SEGMENT_EXTENSION: &str = "ts";

/// File-name prefix of segment files
pub const SEGMENT_PREFIX: &str = "chunk_";

/// Output pattern handed to the segment muxer (`chunk_000.ts` .. `chunk_{N-1}.ts`)
pub const SEGMENT_PATTERN: &str = "chunk_%03d.ts";

/// One time-sliced recording unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Ring index parsed from the file name (None for foreign `.ts` files)
    pub index: Option<u32>,

    /// Full path to the segment file
    pub path: PathBuf,

    /// Last-modified time; indices wrap, so this is the ordering key
    pub modified: SystemTime,
}

/// File name for the segment at a ring index
pub fn segment_file_name(index: u32) -> String {
    format!("{}{:03}.{}", SEGMENT_PREFIX, index, SEGMENT_EXTENSION)
}

/// Parse the ring index out of `chunk_<index>.ts`
pub fn parse_segment_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(&format!(".{}", SEGMENT_EXTENSION))?
        .parse()
        .ok()
}

fn is_segment_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(SEGMENT_EXTENSION))
        .unwrap_or(false)
}

/// List every segment currently in a buffer directory, in directory order.
///
/// A missing directory is an empty buffer. Entries that disappear or change
/// type between listing and stat are skipped; the capture process rewrites
/// files underneath us.
pub async fn list_segments(dir: &Path) -> std::io::Result<Vec<Segment>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut segments = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_segment_file(&path) {
            continue;
        }

        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(_) => continue,
        };

        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_segment_index);

        segments.push(Segment {
            index,
            path,
            modified,
        });
    }

    Ok(segments)
}

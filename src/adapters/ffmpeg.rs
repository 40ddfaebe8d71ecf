//! ffmpeg adapter.
//!
//! Two invocations are used: a long-running segment muxer per channel that
//! writes the ring buffer, and a short concat/trim run per extracted clip.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::ClipEncoder;
use crate::domain::segment::SEGMENT_PATTERN;
use crate::domain::Channel;

/// ffmpeg wrapper
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    /// Path to the ffmpeg binary (default: "ffmpeg" on PATH)
    binary_path: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self::with_binary_path("ffmpeg")
    }

    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Command line of the segment muxer recording a channel's ring buffer
    pub fn capture_command(&self, channel: &Channel) -> CaptureCommand {
        let output = channel.buffer_dir.join(SEGMENT_PATTERN);
        let args = vec![
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            "-i".to_string(),
            channel.stream_url(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            format_seconds(channel.segment_duration),
            "-segment_wrap".to_string(),
            channel.retention_count.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];

        CaptureCommand {
            program: self.binary_path.clone(),
            args,
        }
    }

    /// Arguments for concatenating a manifest and keeping the trailing window
    pub fn concat_trim_args(&self, manifest: &Path, window: Duration, output: &Path) -> Vec<String> {
        let window = format_seconds(window);
        vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-sseof".to_string(),
            format!("-{}", window),
            "-i".to_string(),
            manifest.to_string_lossy().to_string(),
            "-t".to_string(),
            window,
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Check that the binary can be executed
    pub async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {} -version", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg health check failed: {}", stderr.trim());
        }

        Ok(())
    }
}

#[async_trait]
impl ClipEncoder for Ffmpeg {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn concat_trim(&self, manifest: &Path, window: Duration, output: &Path) -> Result<()> {
        let result = Command::new(&self.binary_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(self.concat_trim_args(manifest, window, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn ffmpeg for clip extraction")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let exit_code = result.status.code().unwrap_or(-1);
            anyhow::bail!(
                "ffmpeg concat failed with exit code {}: {}",
                exit_code,
                stderr.trim()
            );
        }

        Ok(())
    }
}

/// A subprocess command line, kept as data so it can be logged and swapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build the process; output is discarded and the child dies with its handle
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Render a concat demuxer manifest for the given inputs
pub fn concat_manifest(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            // Single quotes close, escape, and reopen the quoted string
            let quoted = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", quoted)
        })
        .collect()
}

/// Seconds as ffmpeg expects them: integral when possible
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.3}", duration.as_secs_f64())
    }
}

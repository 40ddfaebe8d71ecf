//! Per-channel ring-buffer recording.
//!
//! A `ChannelRecorder` keeps one capture process alive for its channel. The
//! process writes `chunk_000.ts .. chunk_{N-1}.ts` and wraps, so reusing an
//! index is the only eviction. Whenever the process ends, for whatever
//! reason, it is started again after the policy delay.

use std::process::ExitStatus;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::adapters::CaptureCommand;
use crate::domain::{list_segments, Channel, Segment};

use super::retry::RetryPolicy;

/// Supervisor for one channel's capture process
#[derive(Debug, Clone)]
pub struct ChannelRecorder {
    channel: Channel,
    command: CaptureCommand,
    policy: RetryPolicy,
}

/// How supervision ended (only reachable with a bounded policy)
#[derive(Debug, Clone)]
pub struct SupervisionSummary {
    /// Number of times the capture process was launched (or attempted)
    pub attempts: u32,

    /// Exit status of the last run, if it got as far as running
    pub last_status: Option<ExitStatus>,
}

impl ChannelRecorder {
    pub fn new(channel: Channel, command: CaptureCommand, policy: RetryPolicy) -> Self {
        Self {
            channel,
            command,
            policy,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Create the buffer directory and supervise the capture process in the background
    pub async fn start(self) -> Result<JoinHandle<SupervisionSummary>> {
        self.prepare().await?;
        Ok(tokio::spawn(async move { self.supervise().await }))
    }

    /// Create the channel's buffer directory if absent
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.channel.buffer_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create buffer directory {}",
                    self.channel.buffer_dir.display()
                )
            })
    }

    /// Run the capture process, restarting it after every exit.
    ///
    /// Returns only when a bounded policy runs out of attempts.
    #[instrument(skip(self), fields(channel = self.channel.id))]
    pub async fn supervise(&self) -> SupervisionSummary {
        info!(
            source = %self.channel.source.redacted_url_for(self.channel.id),
            segment_secs = self.channel.segment_duration.as_secs(),
            retention = self.channel.retention_count,
            "Recording ring buffer"
        );

        let mut attempt = 0;
        let mut last_status = None;

        loop {
            attempt += 1;

            match self.command.to_command().spawn() {
                Ok(mut child) => match child.wait().await {
                    Ok(status) => {
                        warn!(%status, attempt, "Capture process exited");
                        last_status = Some(status);
                    }
                    Err(e) => {
                        warn!(attempt, "Failed waiting on capture process: {}", e);
                    }
                },
                Err(e) => {
                    warn!(attempt, program = %self.command.program, "Failed to start capture process: {}", e);
                }
            }

            if !self.policy.should_retry(attempt) {
                warn!(attempt, "Capture retry limit reached; channel no longer recording");
                break;
            }

            info!(delay_ms = self.policy.delay_ms, "Restarting capture");
            tokio::time::sleep(self.policy.delay()).await;
        }

        SupervisionSummary {
            attempts: attempt,
            last_status,
        }
    }

    /// Current ring-buffer contents, oldest first
    pub async fn snapshot(&self) -> Result<Vec<Segment>> {
        let mut segments = list_segments(&self.channel.buffer_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to list buffer directory {}",
                    self.channel.buffer_dir.display()
                )
            })?;
        segments.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamSource;
    use std::time::Duration;
    use tempfile::TempDir;

    fn channel(root: &std::path::Path) -> Channel {
        Channel::new(9, StreamSource::default(), root, Duration::from_secs(45), 4)
    }

    fn exiting(code: i32) -> CaptureCommand {
        CaptureCommand::new("sh", vec!["-c".to_string(), format!("exit {}", code)])
    }

    #[tokio::test]
    async fn test_restarts_until_bounded_policy_is_exhausted() {
        let temp = TempDir::new().unwrap();
        let recorder = ChannelRecorder::new(
            channel(temp.path()),
            exiting(3),
            RetryPolicy::bounded(Duration::from_millis(10), 3),
        );

        let summary = recorder.start().await.unwrap().await.unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.last_status.unwrap().code(), Some(3));
        assert!(temp.path().join("cam9").is_dir());
    }

    #[tokio::test]
    async fn test_clean_exit_is_restarted_too() {
        let temp = TempDir::new().unwrap();
        let recorder = ChannelRecorder::new(
            channel(temp.path()),
            exiting(0),
            RetryPolicy::bounded(Duration::from_millis(10), 2),
        );

        let summary = recorder.supervise().await;
        assert_eq!(summary.attempts, 2);
        assert!(summary.last_status.unwrap().success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_retried() {
        let temp = TempDir::new().unwrap();
        let recorder = ChannelRecorder::new(
            channel(temp.path()),
            CaptureCommand::new("/nonexistent/ffmpeg", vec![]),
            RetryPolicy::bounded(Duration::from_millis(10), 2),
        );

        let summary = recorder.supervise().await;
        assert_eq!(summary.attempts, 2);
        assert!(summary.last_status.is_none());
    }
}

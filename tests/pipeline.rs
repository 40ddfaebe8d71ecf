//! Recording and Trigger Integration Tests
//!
//! Drives a recorder with a shell script standing in for the capture
//! process, then fires triggers through the gateway and watches the outbox.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use replayd::adapters::{CaptureCommand, ClipEncoder};
use replayd::core::{ChannelRecorder, ClipExtractor, ExtractSettings, RetryPolicy};
use replayd::core::{TriggerGateway, TriggerOutcome};
use replayd::delivery::{ClipQueue, DirectoryQueue};
use replayd::domain::{Channel, StreamSource};
use tempfile::TempDir;

/// Encoder that concatenates inputs instead of running ffmpeg
struct ConcatEncoder;

#[async_trait]
impl ClipEncoder for ConcatEncoder {
    fn name(&self) -> &str {
        "concat"
    }

    async fn concat_trim(&self, manifest: &Path, _: Duration, output: &Path) -> anyhow::Result<()> {
        let mut bytes = Vec::new();
        for line in tokio::fs::read_to_string(manifest).await?.lines() {
            let path = line.trim_start_matches("file '").trim_end_matches('\'');
            bytes.extend(tokio::fs::read(path).await?);
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

fn channel(root: &Path, id: u32) -> Channel {
    Channel::new(
        id,
        StreamSource::default(),
        &root.join("buffer"),
        Duration::from_secs(45),
        4,
    )
}

/// Script that writes `writes` segments into a ring of four, then exits
fn ring_writer(dir: &Path, writes: u32) -> CaptureCommand {
    let script = format!(
        "i=0; while [ $i -lt {writes} ]; do \
           printf \"$i\" > \"{dir}/chunk_00$((i % 4)).ts\"; \
           i=$((i + 1)); sleep 0.02; \
         done",
        writes = writes,
        dir = dir.display()
    );
    CaptureCommand::new("sh", vec!["-c".to_string(), script])
}

async fn wait_for_pending(queue: &DirectoryQueue, count: usize) -> bool {
    for _ in 0..100 {
        if queue.list_pending().await.unwrap().len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_ring_buffer_never_exceeds_retention() {
    let temp = TempDir::new().unwrap();
    let channel = channel(temp.path(), 9);
    let command = ring_writer(&channel.buffer_dir, 10);
    let recorder = ChannelRecorder::new(channel, command, RetryPolicy::bounded(Duration::ZERO, 1));

    recorder.prepare().await.unwrap();
    let summary = recorder.supervise().await;
    assert!(summary.last_status.unwrap().success());

    let segments = recorder.snapshot().await.unwrap();
    assert_eq!(segments.len(), 4);

    // Writes 0..9 wrapped three times; oldest surviving write is 6
    let bodies: Vec<String> = segments
        .iter()
        .map(|s| std::fs::read_to_string(&s.path).unwrap())
        .collect();
    assert_eq!(bodies, vec!["6", "7", "8", "9"]);
    assert_eq!(segments[0].index, Some(2));

    // Nothing on disk is older than the ring can hold
    let span = recorder.channel().buffer_span();
    let oldest = segments[0].modified;
    let age = SystemTime::now().duration_since(oldest).unwrap_or_default();
    assert!(age <= span, "oldest segment is {:?} old, span is {:?}", age, span);
    for segment in &segments[1..] {
        assert!(segment.modified >= oldest);
    }
}

#[tokio::test]
async fn test_capture_restart_keeps_existing_segments() {
    let temp = TempDir::new().unwrap();
    let channel = channel(temp.path(), 13);
    let command = ring_writer(&channel.buffer_dir, 2);
    let recorder = ChannelRecorder::new(
        channel,
        command,
        RetryPolicy::bounded(Duration::from_millis(10), 2),
    );

    let summary = recorder.clone().start().await.unwrap().await.unwrap();
    assert_eq!(summary.attempts, 2);

    // Second run overwrote chunk_000 and chunk_001 with the same writes
    assert_eq!(recorder.snapshot().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_trigger_cuts_clip_from_recorded_buffer() {
    let temp = TempDir::new().unwrap();
    let channel = channel(temp.path(), 9);
    let command = ring_writer(&channel.buffer_dir, 5);
    let recorder = ChannelRecorder::new(
        channel.clone(),
        command,
        RetryPolicy::bounded(Duration::ZERO, 1),
    );
    recorder.prepare().await.unwrap();
    recorder.supervise().await;

    let queue = Arc::new(
        DirectoryQueue::open(temp.path().join("outbox"))
            .await
            .unwrap(),
    );
    let extractor = ClipExtractor::new(
        [channel],
        Arc::new(ConcatEncoder),
        queue.clone(),
        ExtractSettings::default(),
    );
    let gateway = TriggerGateway::new(Arc::new(extractor), Duration::from_secs(15));

    assert_eq!(gateway.record_trigger("9"), TriggerOutcome::Accepted);
    assert_eq!(gateway.record_trigger("9"), TriggerOutcome::RateLimited);
    assert_eq!(gateway.record_trigger("13"), TriggerOutcome::UnknownChannel);

    assert!(wait_for_pending(&queue, 1).await);
    let pending = queue.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].channel_id, 9);

    // Newest three writes of 0..4 are 2, 3, 4
    assert_eq!(std::fs::read_to_string(&pending[0].path).unwrap(), "234");
}

#[tokio::test]
async fn test_trigger_on_empty_buffer_queues_nothing() {
    let temp = TempDir::new().unwrap();
    let queue = Arc::new(
        DirectoryQueue::open(temp.path().join("outbox"))
            .await
            .unwrap(),
    );
    let extractor = ClipExtractor::new(
        [channel(temp.path(), 9)],
        Arc::new(ConcatEncoder),
        queue.clone(),
        ExtractSettings::default(),
    );
    let gateway = TriggerGateway::new(Arc::new(extractor), Duration::from_secs(15));

    assert!(gateway.on_trigger(9).is_accepted());
    assert!(!wait_for_pending(&queue, 1).await);
}

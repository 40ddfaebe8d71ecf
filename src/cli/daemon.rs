//! The `replayd run` daemon.
//!
//! Starts one recorder per channel, the delivery loop, and a line-based
//! trigger ingress on stdin (one channel id per line, one JSON answer per
//! line on stdout). Runs until interrupted.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::adapters::{CollectorClient, Ffmpeg};
use crate::config::ResolvedConfig;
use crate::core::{ChannelRecorder, TriggerGateway, TriggerOutcome};
use crate::delivery::{DeliveryQueue, DirectoryQueue};

use super::build_extractor;

/// Lock file guarding an outbox against a second daemon or manual sweep
pub const LOCK_FILE: &str = ".replayd.lock";

/// Answer written to stdout for each trigger line
#[derive(Debug, Serialize)]
struct TriggerReply<'a> {
    channel: &'a str,
    accepted: bool,
    outcome: TriggerOutcome,
}

/// Take the exclusive instance lock on an outbox; released when the file drops
pub fn acquire_instance_lock(outbox: &Path) -> Result<File> {
    std::fs::create_dir_all(outbox)
        .with_context(|| format!("Failed to create outbox {}", outbox.display()))?;

    let path = outbox.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    file.try_lock_exclusive().with_context(|| {
        format!(
            "Another replayd instance is using {} (lock held on {})",
            outbox.display(),
            LOCK_FILE
        )
    })?;

    Ok(file)
}

/// Run the daemon until Ctrl-C
pub async fn run(config: ResolvedConfig) -> Result<()> {
    config.validate()?;

    let _lock = acquire_instance_lock(&config.outbox)?;
    let queue = Arc::new(DirectoryQueue::open(config.outbox.clone()).await?);
    queue.recover().await?;

    let ffmpeg = Ffmpeg::with_binary_path(&config.ffmpeg_binary);
    if let Err(e) = ffmpeg.health_check().await {
        // Recorders keep retrying, so a missing binary is survivable
        warn!("{:#}", e);
    }

    info!(
        channels = ?config.channel_ids,
        segment_secs = config.recording.segment_duration.as_secs(),
        retention = config.recording.retention_count,
        "replayd starting"
    );

    for channel in config.channels() {
        let command = ffmpeg.capture_command(&channel);
        let recorder = ChannelRecorder::new(channel, command, config.restart_policy());
        recorder.start().await?;
    }

    match config.require_collector() {
        Ok(collector) => {
            let client = CollectorClient::new(collector.clone())?;
            info!(url = %client.url(), "Delivery enabled");
            let delivery = Arc::new(DeliveryQueue::new(queue.clone(), Arc::new(client)));
            tokio::spawn(delivery.run(config.sweep_policy()));
        }
        Err(e) => {
            warn!("Delivery disabled: {}", e);
        }
    }

    let extractor = Arc::new(build_extractor(&config, queue));
    let gateway = Arc::new(TriggerGateway::new(extractor, config.cool_down));
    tokio::spawn(read_triggers(gateway));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    Ok(())
}

/// Feed stdin lines to the gateway and answer each on stdout
async fn read_triggers(gateway: Arc<TriggerGateway>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let channel = line.trim();
                if channel.is_empty() {
                    continue;
                }

                let outcome = gateway.record_trigger(channel);
                let reply = TriggerReply {
                    channel,
                    accepted: outcome.is_accepted(),
                    outcome,
                };
                match serde_json::to_string(&reply) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to encode trigger reply: {}", e),
                }
            }
            Ok(None) => {
                info!("Trigger input closed; recording and delivery continue");
                break;
            }
            Err(e) => {
                warn!("Failed to read trigger input: {}", e);
                break;
            }
        }
    }
}

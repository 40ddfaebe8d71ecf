//! Command-line interface for replayd.
//!
//! Provides the long-running daemon plus one-shot commands for operating a
//! kiosk by hand: cutting a clip, forcing a delivery sweep, and inspecting
//! the queue and ring buffers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::adapters::{CollectorClient, Ffmpeg};
use crate::config::{load_config, ResolvedConfig};
use crate::core::{ChannelRecorder, ClipExtractor};
use crate::delivery::{ClipQueue, DeliveryQueue, DirectoryQueue, SweepOutcome};

pub mod daemon;

/// replayd - Ring-buffer recorder with triggered replays and durable upload
#[derive(Parser, Debug)]
#[command(name = "replayd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the nearest .replayd/config.yaml)
    #[arg(short, long, global = true, env = "REPLAYD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record all channels, deliver clips, and read triggers from stdin
    Run,

    /// Cut a replay for a channel right now (ignores the cool-down)
    Trigger {
        /// Channel id
        channel: u32,
    },

    /// Run one delivery sweep and exit
    Sweep,

    /// List clips waiting for delivery
    Queue,

    /// List a channel's ring-buffer segments
    Segments {
        /// Channel id
        channel: u32,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Run => daemon::run(config).await,
            Commands::Trigger { channel } => trigger(&config, channel).await,
            Commands::Sweep => sweep(&config).await,
            Commands::Queue => list_queue(&config).await,
            Commands::Segments { channel } => list_segments(&config, channel).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Build the extractor over the configured channels and outbox
pub(crate) fn build_extractor(
    config: &ResolvedConfig,
    queue: Arc<DirectoryQueue>,
) -> ClipExtractor {
    ClipExtractor::new(
        config.channels(),
        Arc::new(Ffmpeg::with_binary_path(&config.ffmpeg_binary)),
        queue,
        config.extract,
    )
}

/// Extract one clip immediately
async fn trigger(config: &ResolvedConfig, channel: u32) -> Result<()> {
    config.validate()?;
    let queue = Arc::new(DirectoryQueue::open(config.outbox.clone()).await?);
    let extractor = build_extractor(config, queue);

    let clip = extractor
        .extract(channel, Utc::now())
        .await
        .with_context(|| format!("Failed to extract replay for channel {}", channel))?;

    println!("{}", clip.path.display());
    Ok(())
}

/// Deliver pending clips once
async fn sweep(config: &ResolvedConfig) -> Result<()> {
    let _lock = daemon::acquire_instance_lock(&config.outbox)?;

    let collector = CollectorClient::new(config.require_collector()?.clone())?;
    let queue = Arc::new(DirectoryQueue::open(config.outbox.clone()).await?);
    let delivery = DeliveryQueue::new(queue, Arc::new(collector));

    match delivery.sweep().await {
        SweepOutcome::Idle => println!("Queue is empty"),
        SweepOutcome::Skipped => println!("A sweep is already running"),
        SweepOutcome::Completed { delivered } => println!("Delivered {} clip(s)", delivered),
        SweepOutcome::Aborted {
            delivered,
            failed,
            error,
        } => {
            println!("Delivered {} clip(s)", delivered);
            anyhow::bail!("Sweep stopped at {}: {}", failed.display(), error);
        }
    }

    Ok(())
}

/// Print pending clips
async fn list_queue(config: &ResolvedConfig) -> Result<()> {
    let queue = DirectoryQueue::new(config.outbox.clone());
    let pending = queue.list_pending().await?;

    println!();
    println!("Delivery queue: {}", config.outbox.display());
    println!("══════════════════════════════════════════════════════════════");

    if pending.is_empty() {
        println!("(empty)");
        return Ok(());
    }

    println!("{:<8} {:<26} FILE", "CHANNEL", "CREATED");
    for clip in &pending {
        println!(
            "{:<8} {:<26} {}",
            clip.channel_id,
            clip.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            clip.file_name()
        );
    }
    println!();
    println!("{} clip(s) pending", pending.len());

    Ok(())
}

/// Print a channel's ring buffer, oldest first
async fn list_segments(config: &ResolvedConfig, channel_id: u32) -> Result<()> {
    let channel = config
        .channel(channel_id)
        .with_context(|| format!("Channel {} is not configured", channel_id))?;

    let span = channel.buffer_span();
    let dir = channel.buffer_dir.clone();
    let command = Ffmpeg::with_binary_path(&config.ffmpeg_binary).capture_command(&channel);
    let recorder = ChannelRecorder::new(channel, command, config.restart_policy());
    let segments = recorder.snapshot().await?;

    println!();
    println!("Ring buffer: {} (span {}s)", dir.display(), span.as_secs());
    println!("══════════════════════════════════════════════════════════════");

    let now = SystemTime::now();
    for segment in &segments {
        let age = now
            .duration_since(segment.modified)
            .map(|d| format!("{}s ago", d.as_secs()))
            .unwrap_or_else(|_| "in the future".to_string());
        let index = segment
            .index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<6} {:<16} {}", index, age, segment.path.display());
    }
    println!();
    println!("{} segment(s)", segments.len());

    Ok(())
}

/// Print the resolved configuration with secrets masked
fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Config file:    {}", match &config.config_file {
        Some(p) => p.display().to_string(),
        None => "(none, using defaults)".to_string(),
    });
    println!("Home:           {}", config.home.display());
    println!("Buffer root:    {}", config.buffer_root.display());
    println!("Outbox:         {}", config.outbox.display());
    println!("ffmpeg:         {}", config.ffmpeg_binary);
    println!();
    println!("Channels:");
    for channel in config.channels() {
        println!(
            "  {:<4} {}",
            channel.id,
            channel.source.redacted_url_for(channel.id)
        );
    }
    println!();
    println!(
        "Recording:      {}s segments x {} (restart after {}s)",
        config.recording.segment_duration.as_secs(),
        config.recording.retention_count,
        config.recording.restart_delay.as_secs()
    );
    println!(
        "Clips:          last {}s of newest {} segment(s)",
        config.extract.window.as_secs(),
        config.extract.segment_count
    );
    println!("Cool-down:      {}s", config.cool_down.as_secs());
    println!("Sweep period:   {}s", config.sweep_period.as_secs());
    match &config.collector {
        Some(c) => println!(
            "Collector:      {} (secret {})",
            c.url,
            if c.secret.is_empty() { "unset" } else { "set" }
        ),
        None => println!("Collector:      (not configured)"),
    }

    config.validate()
}

//! Configuration for replayd.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (REPLAYD_HOME, REPLAYD_COLLECTOR_URL,
//!    REPLAYD_COLLECTOR_SECRET, REPLAYD_FFMPEG)
//! 2. Config file (`--config <path>` or the nearest .replayd/config.yaml)
//! 3. Defaults (~/.replayd, channels 9 and 13, 45 s segments, ring of 4)
//!
//! Config file discovery:
//! - Searches current directory and parents for .replayd/config.yaml
//! - Relative paths resolve against the directory holding `.replayd/`
//!   (or the config file's own directory when given with `--config`)

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::CollectorConfig;
use crate::core::{ExtractSettings, RetryPolicy};
use crate::domain::{Channel, StreamSource};

/// Config directory name searched for in the current directory and parents
pub const CONFIG_DIR: &str = ".replayd";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: Option<StreamSource>,
    #[serde(default)]
    pub channels: Option<Vec<u32>>,
    #[serde(default)]
    pub recording: Option<RecordingConfig>,
    #[serde(default)]
    pub clips: Option<ClipsConfig>,
    #[serde(default)]
    pub triggers: Option<TriggersConfig>,
    #[serde(default)]
    pub delivery: Option<DeliveryConfig>,
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
    #[serde(default)]
    pub ffmpeg: Option<FfmpegConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Ring-buffer root (default: <home>/buffer)
    pub buffer: Option<String>,
    /// Delivery queue directory (default: <home>/outbox)
    pub outbox: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    pub segment_seconds: Option<u64>,
    pub retention: Option<u32>,
    pub restart_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipsConfig {
    pub segments: Option<usize>,
    pub window_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggersConfig {
    pub cool_down_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    pub sweep_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegConfig {
    pub binary: Option<String>,
}

/// Ring-buffer recording settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSettings {
    pub segment_duration: Duration,
    pub retention_count: u32,
    pub restart_delay: Duration,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_secs(45),
            retention_count: 4,
            restart_delay: Duration::from_secs(2),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// Root of the per-channel ring buffers
    pub buffer_root: PathBuf,
    /// Delivery queue directory
    pub outbox: PathBuf,
    /// Stream source shared by all channels
    pub source: StreamSource,
    /// Monitored channel ids
    pub channel_ids: Vec<u32>,
    pub recording: RecordingSettings,
    pub extract: ExtractSettings,
    pub cool_down: Duration,
    pub sweep_period: Duration,
    /// Remote collector (None = delivery disabled)
    pub collector: Option<CollectorConfig>,
    pub ffmpeg_binary: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Build the configured channels
    pub fn channels(&self) -> Vec<Channel> {
        self.channel_ids
            .iter()
            .map(|&id| {
                Channel::new(
                    id,
                    self.source.clone(),
                    &self.buffer_root,
                    self.recording.segment_duration,
                    self.recording.retention_count,
                )
            })
            .collect()
    }

    pub fn channel(&self, id: u32) -> Option<Channel> {
        self.channels().into_iter().find(|c| c.id == id)
    }

    /// Capture restart policy: fixed delay, forever
    pub fn restart_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(self.recording.restart_delay)
    }

    /// Delivery sweep policy: fixed period, forever
    pub fn sweep_policy(&self) -> RetryPolicy {
        RetryPolicy::unbounded(self.sweep_period)
    }

    /// Collector settings, required for anything that uploads
    pub fn require_collector(&self) -> Result<&CollectorConfig> {
        match &self.collector {
            Some(c) if !c.url.trim().is_empty() => Ok(c),
            _ => anyhow::bail!(
                "No collector configured. Set collector.url in {}/config.yaml or REPLAYD_COLLECTOR_URL",
                CONFIG_DIR
            ),
        }
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_ids.is_empty() {
            anyhow::bail!("At least one channel must be configured");
        }

        let mut seen = HashSet::new();
        for id in &self.channel_ids {
            if !seen.insert(id) {
                anyhow::bail!("Channel {} is configured twice", id);
            }
        }

        if self.recording.segment_duration.is_zero() {
            anyhow::bail!("recording.segment_seconds must be greater than zero");
        }
        if self.recording.retention_count == 0 {
            anyhow::bail!("recording.retention must be greater than zero");
        }
        if self.extract.segment_count == 0 {
            anyhow::bail!("clips.segments must be at least 1");
        }
        if self.extract.window.is_zero() {
            anyhow::bail!("clips.window_seconds must be greater than zero");
        }
        if self.sweep_period.is_zero() {
            anyhow::bail!("delivery.sweep_seconds must be greater than zero");
        }

        Ok(())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config YAML
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    serde_yaml::from_str(content).context("Invalid config YAML")
}

/// Resolve a path that may be relative to the config base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Directory that relative paths in a config file are resolved against
fn base_dir_for(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    let in_config_dir = parent
        .file_name()
        .map(|name| name == CONFIG_DIR)
        .unwrap_or(false);

    if in_config_dir {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    resolve(
        file,
        config_file,
        default_home,
        |key| std::env::var(key).ok(),
    )
}

/// Merge a parsed config file with environment overrides and defaults
pub fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    default_home: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let base_dir = config_file.as_deref().map(base_dir_for);
    let resolve_in_base = |p: &str| match &base_dir {
        Some(base) => resolve_path(base, p),
        None => PathBuf::from(p),
    };

    let home = if let Some(env_home) = env("REPLAYD_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = file.paths.home {
        resolve_in_base(home_path.as_str())
    } else {
        default_home
    };

    let buffer_root = file
        .paths
        .buffer
        .as_deref()
        .map(resolve_in_base)
        .unwrap_or_else(|| home.join("buffer"));

    let outbox = file
        .paths
        .outbox
        .as_deref()
        .map(resolve_in_base)
        .unwrap_or_else(|| home.join("outbox"));

    let defaults = RecordingSettings::default();
    let recording = match &file.recording {
        Some(r) => RecordingSettings {
            segment_duration: r
                .segment_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.segment_duration),
            retention_count: r.retention.unwrap_or(defaults.retention_count),
            restart_delay: r
                .restart_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.restart_delay),
        },
        None => defaults,
    };

    let extract_defaults = ExtractSettings::default();
    let extract = match &file.clips {
        Some(c) => ExtractSettings {
            segment_count: c.segments.unwrap_or(extract_defaults.segment_count),
            window: c
                .window_seconds
                .map(Duration::from_secs)
                .unwrap_or(extract_defaults.window),
        },
        None => extract_defaults,
    };

    let cool_down = Duration::from_secs(
        file.triggers
            .as_ref()
            .and_then(|t| t.cool_down_seconds)
            .unwrap_or(15),
    );

    let sweep_period = Duration::from_secs(
        file.delivery
            .as_ref()
            .and_then(|d| d.sweep_seconds)
            .unwrap_or(30),
    );

    let mut collector = file.collector.clone();
    if let Some(url) = env("REPLAYD_COLLECTOR_URL") {
        let mut c = collector.unwrap_or(CollectorConfig {
            url: String::new(),
            secret: String::new(),
            timeout_seconds: None,
        });
        c.url = url;
        collector = Some(c);
    }
    if let (Some(secret), Some(c)) = (env("REPLAYD_COLLECTOR_SECRET"), collector.as_mut()) {
        c.secret = secret;
    }

    let ffmpeg_binary = env("REPLAYD_FFMPEG")
        .or_else(|| file.ffmpeg.as_ref().and_then(|f| f.binary.clone()))
        .unwrap_or_else(|| "ffmpeg".to_string());

    Ok(ResolvedConfig {
        home,
        buffer_root,
        outbox,
        source: file.source.unwrap_or_default(),
        channel_ids: file.channels.unwrap_or_else(|| vec![9, 13]),
        recording,
        extract,
        cool_down,
        sweep_period,
        collector,
        ffmpeg_binary,
        config_file,
    })
}

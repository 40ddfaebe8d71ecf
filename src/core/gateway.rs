//! Trigger gateway.
//!
//! Accepts trigger events per channel, drops repeats inside the cool-down
//! window, and hands accepted triggers to the extractor on a background
//! task. Answering a trigger costs a parse and a timestamp comparison; it
//! never waits on disk or on ffmpeg.
//!
//! Cool-down state lives in memory only, so the first trigger after a
//! restart is always accepted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::extractor::{ClipExtractor, ExtractError};

/// Answer to a trigger request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Extraction scheduled
    Accepted,

    /// Inside the cool-down window; nothing happened
    RateLimited,

    /// Well-formed id, but no such channel is configured
    UnknownChannel,

    /// Not a channel id at all
    Malformed,
}

impl TriggerOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Cool-down filter in front of the extractor
pub struct TriggerGateway {
    extractor: Arc<ClipExtractor>,
    cool_down: Duration,
    last_accepted: Mutex<HashMap<u32, Instant>>,
}

impl TriggerGateway {
    pub fn new(extractor: Arc<ClipExtractor>, cool_down: Duration) -> Self {
        Self {
            extractor,
            cool_down,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// Handle a raw trigger from the ingress (channel id as text)
    pub fn record_trigger(&self, raw: &str) -> TriggerOutcome {
        match raw.trim().parse::<u32>() {
            Ok(channel_id) => self.on_trigger(channel_id),
            Err(_) => {
                debug!(input = raw.trim(), "Malformed trigger");
                TriggerOutcome::Malformed
            }
        }
    }

    /// Handle a trigger for a channel; must be called inside a Tokio runtime
    pub fn on_trigger(&self, channel_id: u32) -> TriggerOutcome {
        if !self.extractor.has_channel(channel_id) {
            warn!(channel = channel_id, "Trigger for unknown channel");
            return TriggerOutcome::UnknownChannel;
        }

        if !self.admit(channel_id, Instant::now()) {
            info!(channel = channel_id, "Trigger rate limited");
            return TriggerOutcome::RateLimited;
        }

        info!(channel = channel_id, "Trigger accepted; extracting replay");
        let extractor = Arc::clone(&self.extractor);
        let trigger_time = Utc::now();
        tokio::spawn(async move {
            match extractor.extract(channel_id, trigger_time).await {
                Ok(_) => {}
                Err(ExtractError::NoRecordingsAvailable(_)) => {
                    warn!(channel = channel_id, "No recordings available yet; trigger dropped");
                }
                Err(e) => {
                    error!(channel = channel_id, "Clip extraction failed: {}", e);
                }
            }
        });

        TriggerOutcome::Accepted
    }

    /// Record `now` as the last accepted trigger unless still cooling down
    fn admit(&self, channel_id: u32, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = last.get(&channel_id) {
            if now.saturating_duration_since(*previous) < self.cool_down {
                return false;
            }
        }

        last.insert(channel_id, now);
        true
    }
}

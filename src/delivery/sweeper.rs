//! Periodic delivery of queued clips.
//!
//! A sweep walks the pending clips in order and uploads them one at a time.
//! A clip is acked (deleted) only after the collector acknowledges it. The
//! first failure ends the sweep and leaves that clip and everything after it
//! in place; the next sweep starts again from the top. There is no retry
//! counter and no dead-lettering: a clip stays queued until it gets through.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::Collector;
use crate::core::RetryPolicy;

use super::store::ClipQueue;

/// Result of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep was already running; nothing done
    Skipped,

    /// Queue was empty
    Idle,

    /// Every pending clip was delivered
    Completed { delivered: usize },

    /// Stopped at the first failure; `failed` and later clips remain queued
    Aborted {
        delivered: usize,
        failed: PathBuf,
        error: String,
    },
}

impl SweepOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            Self::Completed { delivered } | Self::Aborted { delivered, .. } => *delivered,
            Self::Skipped | Self::Idle => 0,
        }
    }
}

/// Delivers queued clips to the collector
pub struct DeliveryQueue {
    queue: Arc<dyn ClipQueue>,
    collector: Arc<dyn Collector>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the sweep ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeliveryQueue {
    pub fn new(queue: Arc<dyn ClipQueue>, collector: Arc<dyn Collector>) -> Self {
        Self {
            queue,
            collector,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one sweep over the pending clips
    #[instrument(skip(self), fields(collector = self.collector.name()))]
    pub async fn sweep(&self) -> SweepOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in flight");
            return SweepOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let pending = match self.queue.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to list pending clips: {}", e);
                return SweepOutcome::Aborted {
                    delivered: 0,
                    failed: PathBuf::new(),
                    error: e.to_string(),
                };
            }
        };

        if pending.is_empty() {
            return SweepOutcome::Idle;
        }

        info!(pending = pending.len(), "Delivering queued clips");

        let mut delivered = 0;
        for clip in &pending {
            debug!(clip = %clip.file_name(), channel = clip.channel_id, "Uploading clip");

            let failure = match self.collector.upload(clip).await {
                Ok(ack) => match self.queue.ack(clip).await {
                    Ok(()) => {
                        info!(clip = %clip.file_name(), message = %ack.message, "Clip delivered");
                        delivered += 1;
                        continue;
                    }
                    // Delivered but still on disk: it will be sent again later
                    Err(e) => format!("acknowledged but not removed: {}", e),
                },
                Err(e) => format!("{:#}", e),
            };

            warn!(
                clip = %clip.file_name(),
                remaining = pending.len() - delivered,
                "Upload failed, clip stays queued: {}",
                failure
            );
            return SweepOutcome::Aborted {
                delivered,
                failed: clip.path.clone(),
                error: failure,
            };
        }

        SweepOutcome::Completed { delivered }
    }

    /// Sweep once immediately, then every `policy.delay`.
    ///
    /// Each tick runs its sweep on a separate task, so a tick that lands
    /// while a slow sweep is still uploading is a no-op. Returns only when a
    /// bounded policy has used up its ticks.
    pub async fn run(self: Arc<Self>, policy: RetryPolicy) {
        info!(period_ms = policy.delay_ms, "Delivery loop started");

        let mut ticker = tokio::time::interval(policy.delay());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0;
        let last = loop {
            ticker.tick().await;
            ticks += 1;

            let this = Arc::clone(&self);
            let handle = tokio::spawn(async move { this.sweep().await });

            if !policy.should_retry(ticks) {
                break handle;
            }
        };

        // Let the final sweep of a bounded run finish
        let _ = last.await;
    }
}

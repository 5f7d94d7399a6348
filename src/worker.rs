//! Analysis and action worker
//!
//! The single consumer of the event queue. Each event is normalized and tested
//! against every target pattern; matches are posted. The idle watchdog and the
//! heartbeat timer share the worker's `select!` loop, so the idle counter is
//! only ever touched here.

use crate::config::{BotConfig, FilterConfig, TargetPattern};
use crate::filter::CandidateEvent;
use crate::metrics;
use crate::normalize::Normalizer;
use crate::poster::ActionPoster;
use crate::predicate::MatchPredicate;
use crate::queue::QueueReceiver;
use crate::stream::CloseSignal;
use crate::watchdog::{Heartbeat, IdleWatchdog};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Normalization plus predicate evaluation
pub struct Analyzer {
    normalizer: Normalizer,
    predicate: Arc<dyn MatchPredicate>,
    patterns: Vec<TargetPattern>,
}

impl Analyzer {
    pub fn new(config: &FilterConfig, predicate: Arc<dyn MatchPredicate>) -> Result<Self> {
        Ok(Self {
            normalizer: Normalizer::new(config)?,
            predicate,
            patterns: config.patterns.clone(),
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    /// Patterns the normalized text fits, in configuration order
    pub fn matching_patterns(&self, normalized: &str) -> Vec<&TargetPattern> {
        self.patterns
            .iter()
            .filter(|pattern| self.predicate.matches(normalized, &pattern.segments))
            .collect()
    }
}

/// Why the worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed and everything in it handled
    Drained,
    /// The stream was silent for the whole watchdog window
    WatchdogTimeout,
}

/// Timer settings for one worker
#[derive(Debug, Clone)]
pub struct WorkerTimers {
    pub idle_timeout: Duration,
    pub max_idle_ticks: u32,
    pub heartbeat_interval: Duration,
}

impl From<&BotConfig> for WorkerTimers {
    fn from(config: &BotConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            max_idle_ticks: config.max_idle_ticks,
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

/// Queue consumer
pub struct Worker {
    analyzer: Arc<Analyzer>,
    poster: Arc<ActionPoster>,
    timers: WorkerTimers,
    heartbeat: Option<Heartbeat>,
}

impl Worker {
    pub fn new(analyzer: Arc<Analyzer>, poster: Arc<ActionPoster>, timers: WorkerTimers) -> Self {
        Self {
            analyzer,
            poster,
            timers,
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Option<Heartbeat>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Consume until the queue drains or the watchdog closes the connection
    pub async fn run(&self, mut queue: QueueReceiver, closer: CloseSignal) -> WorkerExit {
        let mut watchdog = IdleWatchdog::new(self.timers.max_idle_ticks);

        let idle = sleep(self.timers.idle_timeout);
        tokio::pin!(idle);

        let period = self.timers.heartbeat_interval;
        let mut heartbeat_timer = interval_at(Instant::now() + period, period);
        heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = queue.dequeue() => {
                    let Some(event) = event else {
                        debug!("Event queue drained");
                        return WorkerExit::Drained;
                    };
                    watchdog.reset();
                    self.handle(event).await;
                    idle.as_mut().reset(Instant::now() + self.timers.idle_timeout);
                }
                _ = &mut idle => {
                    idle.as_mut().reset(Instant::now() + self.timers.idle_timeout);
                    if watchdog.idle_tick() {
                        warn!(idle_ticks = watchdog.idle_ticks(), "No events received, closing connection");
                        metrics::record_watchdog_timeout();
                        closer.close();
                        return WorkerExit::WatchdogTimeout;
                    }
                    debug!(idle_ticks = watchdog.idle_ticks(), "Health check");
                }
                _ = heartbeat_timer.tick() => {
                    if let Some(ref heartbeat) = self.heartbeat {
                        heartbeat.spawn_ping();
                    }
                }
            }
        }
    }

    /// Analyze one event and post a reply for every matched pattern
    pub async fn handle(&self, event: CandidateEvent) {
        let normalized = self.analyzer.normalize(&event.text);

        for pattern in self.analyzer.matching_patterns(&normalized) {
            info!(
                pattern = %pattern.name,
                author = %event.author_id,
                text = %normalized,
                "Matched"
            );
            metrics::record_match(&pattern.name);

            let reply = format!("{} {}", normalized, pattern.suffix);
            if let Err(e) = self
                .poster
                .post(&event.collection, &event.author_id, &event.record_key, &reply)
                .await
            {
                error!(
                    pattern = %pattern.name,
                    author = %event.author_id,
                    rkey = %event.record_key,
                    "Post failed: {}",
                    e
                );
            }
        }
    }
}

//! Liveness watchdog
//!
//! The idle counter belongs to the worker loop: each idle-timer expiry without
//! a dequeue is one tick, a dequeue resets it, and reaching the limit means the
//! stream has gone silent. The heartbeat ping is independent of idleness.

use crate::metrics;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Timeout for one heartbeat request
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Counts consecutive idle ticks
#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    idle_ticks: u32,
    max_idle_ticks: u32,
}

impl IdleWatchdog {
    pub fn new(max_idle_ticks: u32) -> Self {
        Self {
            idle_ticks: 0,
            max_idle_ticks,
        }
    }

    /// An event arrived
    pub fn reset(&mut self) {
        self.idle_ticks = 0;
    }

    /// The idle timer expired. Returns true once the limit is reached.
    pub fn idle_tick(&mut self) -> bool {
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        self.idle_ticks >= self.max_idle_ticks
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }
}

/// Heartbeat failures
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("heartbeat request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Receiver of heartbeat pings
#[async_trait]
pub trait PingTarget: Send + Sync + fmt::Debug {
    async fn ping(&self) -> Result<(), HeartbeatError>;
}

/// GET against a monitoring URL
#[derive(Debug, Clone)]
pub struct HttpPing {
    url: String,
    client: Client,
}

impl HttpPing {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PingTarget for HttpPing {
    async fn ping(&self) -> Result<(), HeartbeatError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(HEARTBEAT_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %self.url, status = %response.status(), "Heartbeat sent");
        Ok(())
    }
}

/// Fire-and-forget pinger used by the worker
#[derive(Debug, Clone)]
pub struct Heartbeat {
    target: Arc<dyn PingTarget>,
}

impl Heartbeat {
    /// Ping `url` over HTTP
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_target(Arc::new(HttpPing::new(url)))
    }

    pub fn with_target(target: Arc<dyn PingTarget>) -> Self {
        Self { target }
    }

    /// Fire one ping on its own task; failures are only logged
    pub fn spawn_ping(&self) -> tokio::task::JoinHandle<()> {
        let target = self.target.clone();
        tokio::spawn(async move {
            if let Err(e) = target.ping().await {
                warn!(pinger = ?target, error = %e, "Heartbeat failed");
                metrics::record_heartbeat_failure();
            }
        })
    }
}

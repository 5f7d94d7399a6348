//! Runtime configuration for the bot service
//!
//! Assembled once at startup from flags and environment variables (see `main.rs`)
//! and shared read-only with every pipeline run.

use crate::stream::DEFAULT_JETSTREAM_URL;
use std::time::Duration;

/// Default write endpoint (PDS host)
pub const DEFAULT_HOST: &str = "https://bsky.social";

/// Default bot handle
pub const DEFAULT_HANDLE: &str = "haiku.bsky.social";

/// Default debug server address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:6060";

/// Default event queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default idle tick (10 seconds)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Consecutive idle ticks before the watchdog closes the connection (~10 minutes)
pub const DEFAULT_MAX_IDLE_TICKS: u32 = 60;

/// Default heartbeat interval (5 minutes)
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Pause between a failed dial and the next attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Audit lines buffered before new ones are dropped
pub const DEFAULT_AUDIT_BUFFER: usize = 1024;

/// Bot service configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Relay stream endpoint (websocket URL)
    pub jetstream_url: String,

    /// Write endpoint (PDS base URL)
    pub host: String,

    /// Account handle used to create sessions
    pub handle: String,

    /// Account secret (app password)
    pub password: String,

    /// Optional liveness-reporting URL pinged on every heartbeat
    pub heartbeat_url: Option<String>,

    /// Address for the health/metrics server, `None` disables it
    pub listen_addr: Option<String>,

    /// Bounded event queue capacity
    pub queue_capacity: usize,

    /// Idle tick length
    pub idle_timeout: Duration,

    /// Idle ticks tolerated before forcing a reconnect
    pub max_idle_ticks: u32,

    /// Heartbeat interval
    pub heartbeat_interval: Duration,

    /// Delay before redialing after a failed connect
    pub reconnect_delay: Duration,

    /// Audit line buffer size
    pub audit_buffer: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            jetstream_url: DEFAULT_JETSTREAM_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            handle: DEFAULT_HANDLE.to_string(),
            password: String::new(),
            heartbeat_url: None,
            listen_addr: Some(DEFAULT_LISTEN_ADDR.to_string()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_idle_ticks: DEFAULT_MAX_IDLE_TICKS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            audit_buffer: DEFAULT_AUDIT_BUFFER,
        }
    }
}

impl BotConfig {
    /// Create a config with credentials and defaults for everything else
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Set the relay stream endpoint
    pub fn with_jetstream_url(mut self, url: impl Into<String>) -> Self {
        self.jetstream_url = url.into();
        self
    }

    /// Set the write endpoint
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the heartbeat URL
    pub fn with_heartbeat_url(mut self, url: Option<String>) -> Self {
        self.heartbeat_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Set the debug server address
    pub fn with_listen_addr(mut self, addr: Option<String>) -> Self {
        self.listen_addr = addr.filter(|a| !a.trim().is_empty());
        self
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the idle tick length and how many ticks are tolerated
    pub fn with_idle_timeout(mut self, timeout: Duration, max_ticks: u32) -> Self {
        self.idle_timeout = timeout;
        self.max_idle_ticks = max_ticks;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Total idle time before the watchdog fires
    pub fn watchdog_window(&self) -> Duration {
        self.idle_timeout * self.max_idle_ticks
    }
}

//! Configuration system
//!
//! - `BotConfig`: endpoints, credentials and timer settings, from flags/environment
//! - `FilterConfig`: filter and normalization rules, optionally from YAML
//! - `validation`: startup checks; a failure here is the only fatal error

mod bot_config;
mod filter_config;
pub mod validation;

pub use bot_config::{
    BotConfig, DEFAULT_HANDLE, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_IDLE_TICKS, DEFAULT_QUEUE_CAPACITY,
};
pub use filter_config::{FilterConfig, TargetPattern};
pub use validation::{validate_config_result, ValidationError};

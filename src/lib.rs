//! haikubot - a Bluesky bot that finds accidental haiku
//!
//! Reads the network's post stream, picks out Japanese posts whose text falls
//! into 5-7-5 (haiku) or 5-7-5-7-7 (tanka) morae, and quote-replies to them. It is
//! meant to run unattended: dropped connections, silent streams and failed
//! writes restart or retry the affected part instead of stopping the process.
//!
//! # Architecture
//!
//! - **stream**: websocket connection and Jetstream frame decoding
//! - **filter**: cheap per-operation rules on the read path
//! - **queue**: bounded hand-off between producer and worker
//! - **producer**: read loop feeding the queue
//! - **worker**: normalization, predicate and posting, plus the idle watchdog
//! - **poster**: XRPC session handling and the reply write with retries
//! - **supervisor**: one connection per run, restarted forever
//! - **predicate**: the pluggable match test and the mora counter
//! - **config**: bot settings, filter rules, validation
//! - **server**: `/health` and `/metrics`

// Pipeline
pub mod audit;
pub mod filter;
pub mod normalize;
pub mod poster;
pub mod producer;
pub mod queue;
pub mod stream;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

// Supporting modules
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod predicate;
pub mod retry;
pub mod server;

// Re-exports
pub use error::{HaikuBotError, Result};

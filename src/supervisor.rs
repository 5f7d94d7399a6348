//! Supervisor loop
//!
//! Owns the connection for each run and restarts the pipeline forever. One run
//! goes `Connecting → Streaming → Draining → Restarting`: dial, start the worker,
//! drive the producer until the stream fails or the watchdog closes it, close
//! the queue, wait for the worker to drain.

use crate::audit::AuditSink;
use crate::config::BotConfig;
use crate::filter::EventFilter;
use crate::metrics;
use crate::poster::ActionPoster;
use crate::producer::Producer;
use crate::queue;
use crate::stream::{CloseSignal, Connector, StreamError};
use crate::watchdog::Heartbeat;
use crate::worker::{Analyzer, Worker, WorkerExit, WorkerTimers};
use crate::{HaikuBotError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Where the supervisor is in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Connecting,
    Streaming,
    Draining,
    Restarting,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Connecting => "connecting",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Restarting => "restarting",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components shared by every run
#[derive(Clone)]
pub struct Pipeline {
    pub filter: Arc<EventFilter>,
    pub analyzer: Arc<Analyzer>,
    pub poster: Arc<ActionPoster>,
    pub audit: AuditSink,
    pub heartbeat: Option<Heartbeat>,
}

/// Restarts the pipeline on every failure
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    pipeline: Pipeline,
    queue_capacity: usize,
    reconnect_delay: Duration,
    timers: WorkerTimers,
    state: watch::Sender<PipelineState>,
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>, pipeline: Pipeline, config: &BotConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Connecting);
        Self {
            connector,
            pipeline,
            queue_capacity: config.queue_capacity,
            reconnect_delay: config.reconnect_delay,
            timers: WorkerTimers::from(config),
            state,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn enter(&self, state: PipelineState) {
        debug!(state = %state, "Pipeline state");
        self.state.send_replace(state);
        metrics::set_health_status(state == PipelineState::Streaming);
    }

    /// One connection lifetime
    ///
    /// Returns how the worker ended, or the transport error that ended the
    /// stream. The worker has always finished its queue when this returns.
    pub async fn run_once(&self) -> Result<WorkerExit> {
        self.enter(PipelineState::Connecting);
        let source = self.connector.connect().await?;

        self.enter(PipelineState::Streaming);
        let (mut sender, receiver) = queue::bounded(self.queue_capacity);
        let closer = CloseSignal::new();

        let worker = Worker::new(
            self.pipeline.analyzer.clone(),
            self.pipeline.poster.clone(),
            self.timers.clone(),
        )
        .with_heartbeat(self.pipeline.heartbeat.clone());
        let worker_closer = closer.clone();
        let worker_task = tokio::spawn(async move { worker.run(receiver, worker_closer).await });

        let producer = Producer::new(self.pipeline.filter.clone(), self.pipeline.audit.clone());
        let streamed = producer.run(source, &sender, &closer).await;

        self.enter(PipelineState::Draining);
        sender.close();
        let exit = worker_task
            .await
            .map_err(|e| HaikuBotError::Other(format!("Worker task failed: {}", e)))?;

        self.enter(PipelineState::Restarting);
        streamed.map(|_| exit)
    }

    /// Run forever; only fatal errors return
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(WorkerExit::WatchdogTimeout) => {
                    info!("Watchdog closed the connection, reconnecting");
                    metrics::record_restart("watchdog");
                }
                Ok(WorkerExit::Drained) => {
                    info!("Connection closed, reconnecting");
                    metrics::record_restart("closed");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(error = %e, "Pipeline run failed");
                    metrics::record_restart(restart_cause(&e));
                }
            }

            self.enter(PipelineState::Restarting);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}

/// Metric label for a run-ending error
fn restart_cause(err: &HaikuBotError) -> &'static str {
    match err {
        HaikuBotError::Stream(StreamError::Connection(_) | StreamError::Timeout) => "dial",
        HaikuBotError::Stream(StreamError::Ended) => "ended",
        HaikuBotError::Stream(StreamError::ErrorFrame { .. }) => "error_frame",
        HaikuBotError::Stream(StreamError::Decode(_)) => "decode",
        HaikuBotError::Stream(_) => "stream",
        HaikuBotError::Queue(_) => "queue",
        _ => "other",
    }
}

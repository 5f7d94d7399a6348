//! haikubot
//!
//! Main entry point: either checks the given words (`-t`) or runs the bot.

use anyhow::{Context, Result};
use clap::Parser;
use haikubot::audit::AuditSink;
use haikubot::cli::{self, Cli};
use haikubot::config::{validate_config_result, BotConfig, FilterConfig};
use haikubot::filter::EventFilter;
use haikubot::poster::{ActionPoster, XrpcClient};
use haikubot::server;
use haikubot::stream::WebSocketConnector;
use haikubot::supervisor::{Pipeline, Supervisor};
use haikubot::watchdog::Heartbeat;
use haikubot::worker::Analyzer;
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = haikubot::logging::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let filter_config = cli
        .filter_config()
        .with_context(|| format!("Failed to load filter config from {:?}", cli.config))?;
    let counter = cli
        .mora_counter()
        .with_context(|| format!("Failed to load readings from {:?}", cli.dict))?;
    let analyzer = Analyzer::new(&filter_config, Arc::new(counter))
        .context("Invalid normalization patterns")?;

    if cli.test {
        return Ok(cli::check(&analyzer, &cli.words.join(" ")));
    }

    let bot = cli.bot_config();
    validate_config_result(&bot, &filter_config).context("Configuration validation failed")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the tokio runtime")?;
    runtime.block_on(serve(bot, filter_config, analyzer))?;
    Ok(0)
}

async fn serve(
    bot: BotConfig,
    filter_config: FilterConfig,
    analyzer: Analyzer,
) -> Result<()> {
    let writer = Arc::new(XrpcClient::new(&bot.host));
    let (audit, _audit_task) = AuditSink::stdout(bot.audit_buffer);

    let pipeline = Pipeline {
        filter: Arc::new(EventFilter::new(&filter_config).context("Invalid filter rules")?),
        analyzer: Arc::new(analyzer),
        poster: Arc::new(ActionPoster::new(writer, &bot.handle, &bot.password)),
        audit,
        heartbeat: bot.heartbeat_url.as_deref().map(Heartbeat::new),
    };
    let connector = Arc::new(WebSocketConnector::new(&bot.jetstream_url));
    let supervisor = Supervisor::new(connector, pipeline, &bot);

    if let Some(addr) = bot.listen_addr.clone() {
        let state = supervisor.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&addr, state).await {
                tracing::error!(addr = %addr, error = %e, "Debug server stopped");
            }
        });
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        handle = %bot.handle,
        jetstream = %bot.jetstream_url,
        "Starting haikubot"
    );

    tokio::select! {
        result = supervisor.run_forever() => result.context("Pipeline stopped"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

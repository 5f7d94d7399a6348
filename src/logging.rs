//! Logging configuration using tracing
//!
//! Structured logging to stderr with support for the RUST_LOG environment variable.
//! Stdout is left alone: it carries the audit stream and the URIs of created posts.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Added on top of `RUST_LOG` by `--verbose`
const VERBOSE_DIRECTIVE: &str = "haikubot=debug";

/// Initialize the tracing subscriber
///
/// Sets up structured logging with:
/// - Filtering via RUST_LOG (defaults to "info"); `verbose` adds `haikubot=debug` either way
/// - Formatted output to stderr
///
/// # Example RUST_LOG values
/// - `RUST_LOG=warn` - Only warnings and errors
/// - `RUST_LOG=haikubot=debug` - Debug level for haikubot, predicate tracing included
/// - `RUST_LOG=haikubot::poster=trace,info` - Trace posting, info elsewhere
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init(verbose: bool) -> crate::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(verbose)?)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| {
            crate::HaikuBotError::Other(format!("Failed to initialize tracing: {}", e))
        })?;

    Ok(())
}

/// `RUST_LOG` (default "info"), with haikubot raised to debug when `verbose`
fn env_filter(verbose: bool) -> crate::Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if !verbose {
        return Ok(filter);
    }
    let directive = VERBOSE_DIRECTIVE
        .parse()
        .map_err(|e| crate::HaikuBotError::Other(format!("Invalid log directive: {}", e)))?;
    Ok(filter.add_directive(directive))
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(true);
}

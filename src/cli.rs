//! Command-line interface
//!
//! Every setting can come from a flag or from its environment variable.

use crate::config::{
    BotConfig, FilterConfig, DEFAULT_HANDLE, DEFAULT_HOST, DEFAULT_LISTEN_ADDR,
};
use crate::predicate::{MoraCounter, ReadingDictionary};
use crate::stream::DEFAULT_JETSTREAM_URL;
use crate::worker::Analyzer;
use crate::Result;
use clap::Parser;
use std::path::PathBuf;

/// haikubot - answers Japanese haiku and tanka on Bluesky
#[derive(Parser, Debug)]
#[command(name = "haikubot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Check WORDS instead of running the bot; exits 0 on a match
    #[arg(short = 't', long = "test")]
    pub test: bool,

    /// Words to check with --test
    #[arg(value_name = "WORDS", requires = "test")]
    pub words: Vec<String>,

    /// Enable debug output, including predicate traces
    #[arg(short, long)]
    pub verbose: bool,

    /// Jetstream subscribe URL
    #[arg(long, env = "HAIKUBOT_JETSTREAM", default_value = DEFAULT_JETSTREAM_URL)]
    pub jetstream: String,

    /// PDS host replies are written to
    #[arg(long, env = "HAIKUBOT_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Bot account handle
    #[arg(long, env = "HAIKUBOT_HANDLE", default_value = DEFAULT_HANDLE)]
    pub handle: String,

    /// Bot account password (required to run the bot)
    #[arg(long, env = "HAIKUBOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// URL pinged every five minutes
    #[arg(long, env = "HEARTBEAT_URL")]
    pub heartbeat_url: Option<String>,

    /// Debug server address (empty to disable)
    #[arg(long, env = "HAIKUBOT_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// YAML file overriding the filter rules
    #[arg(long, env = "HAIKUBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// CSV of extra `surface,reading` entries for the mora counter
    #[arg(long, env = "HAIKUBOT_DICT")]
    pub dict: Option<PathBuf>,
}

impl Cli {
    /// Bot settings from flags and environment
    pub fn bot_config(&self) -> BotConfig {
        let listen = Some(self.listen.trim())
            .filter(|addr| !addr.is_empty())
            .map(str::to_string);
        let heartbeat = self
            .heartbeat_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        BotConfig::new(&self.handle, self.password.clone().unwrap_or_default())
            .with_jetstream_url(&self.jetstream)
            .with_host(&self.host)
            .with_heartbeat_url(heartbeat)
            .with_listen_addr(listen)
    }

    /// Filter rules from `--config`, or the built-in ones
    pub fn filter_config(&self) -> Result<FilterConfig> {
        match self.config {
            Some(ref path) => FilterConfig::load(path),
            None => Ok(FilterConfig::default()),
        }
    }

    /// Built-in reading dictionary plus `--dict`
    pub fn mora_counter(&self) -> Result<MoraCounter> {
        let mut dictionary = ReadingDictionary::builtin();
        if let Some(ref path) = self.dict {
            let extra = ReadingDictionary::load(path)?;
            tracing::debug!(entries = extra.len(), path = %path.display(), "Loaded extra readings");
            dictionary.merge(extra);
        }
        Ok(MoraCounter::new(dictionary))
    }
}

/// Evaluate `text` the way the worker would and report on stdout
///
/// Prints the normalized text, then the first matching pattern name in capitals
/// (`HAIKU!`). Returns the process exit code.
pub fn check(analyzer: &Analyzer, text: &str) -> i32 {
    let normalized = analyzer.normalize(text);
    println!("{}", normalized);

    match analyzer.matching_patterns(&normalized).first() {
        Some(pattern) => {
            println!("{}!", pattern.name.to_uppercase());
            0
        }
        None => 1,
    }
}

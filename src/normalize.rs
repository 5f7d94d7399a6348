//! Text normalization before matching
//!
//! Drops whitespace-separated tokens that are links or hashtags and rejoins the
//! rest with single spaces.

use crate::config::FilterConfig;
use crate::Result;
use regex::Regex;

/// Compiled normalization rules
#[derive(Debug, Clone)]
pub struct Normalizer {
    link: Regex,
    tag: Regex,
}

impl Normalizer {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            link: Regex::new(&config.link_pattern)?,
            tag: Regex::new(&config.tag_pattern)?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|word| !self.link.is_match(word) && !self.tag.is_match(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

//! Filter and normalization rules
//!
//! Every rule the pipeline applies to incoming posts lives here rather than in
//! code, so the defaults can be overridden from a YAML file:
//!
//! ```yaml
//! target_language: ja
//! completion_marker: "#n575"
//! blocklist:
//!   - did:plc:7n2uogskixiouu4ofz3o4vdf
//! patterns:
//!   - name: haiku
//!     segments: [5, 7, 5]
//!     suffix: "#n575 #haiku"
//! ```

use crate::stream::FEED_POST_TYPE;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A structure the match predicate is asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPattern {
    /// Name used in logs and metrics
    pub name: String,

    /// Mora count of each line
    pub segments: Vec<usize>,

    /// Appended to the matched text when posting
    pub suffix: String,
}

impl TargetPattern {
    pub fn new(name: impl Into<String>, segments: Vec<usize>, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments,
            suffix: suffix.into(),
        }
    }

    /// 5-7-5
    pub fn haiku() -> Self {
        Self::new("haiku", vec![5, 7, 5], "#n575 #haiku")
    }

    /// 5-7-5-7-7
    pub fn tanka() -> Self {
        Self::new("tanka", vec![5, 7, 5, 7, 7], "#n57577 #tanka")
    }
}

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Record collection that is analyzed
    #[serde(default = "default_target_collection")]
    pub target_collection: String,

    /// Language tag a post must carry when it declares any
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Posts containing this text were already answered (or are our own)
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,

    /// A post must contain at least one character matching this
    #[serde(default = "default_script_pattern")]
    pub script_pattern: String,

    /// Whitespace tokens matching this are dropped during normalization
    #[serde(default = "default_link_pattern")]
    pub link_pattern: String,

    /// Whitespace tokens matching this are dropped during normalization
    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,

    /// Authors whose posts are never analyzed
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,

    /// Patterns evaluated, in order, for every candidate
    #[serde(default = "default_patterns")]
    pub patterns: Vec<TargetPattern>,
}

fn default_target_collection() -> String {
    FEED_POST_TYPE.to_string()
}

fn default_target_language() -> String {
    "ja".to_string()
}

fn default_completion_marker() -> String {
    "#n575".to_string()
}

fn default_script_pattern() -> String {
    "[０-９Ａ-Ｚａ-ｚぁ-ゖァ-ヾ一-鶴]".to_string()
}

fn default_link_pattern() -> String {
    r"^\w+://\S+$".to_string()
}

fn default_tag_pattern() -> String {
    r"^#\S+$".to_string()
}

fn default_blocklist() -> Vec<String> {
    vec![
        "did:plc:7n2uogskixiouu4ofz3o4vdf".to_string(),
        "did:plc:dxx5meybbce2bhqxxviivwhm".to_string(),
        "did:plc:bb5yxpnjg3ev7zuh7sdg43s6".to_string(),
    ]
}

fn default_patterns() -> Vec<TargetPattern> {
    vec![TargetPattern::haiku(), TargetPattern::tanka()]
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            target_collection: default_target_collection(),
            target_language: default_target_language(),
            completion_marker: default_completion_marker(),
            script_pattern: default_script_pattern(),
            link_pattern: default_link_pattern(),
            tag_pattern: default_tag_pattern(),
            blocklist: default_blocklist(),
            patterns: default_patterns(),
        }
    }
}

impl FilterConfig {
    /// Load from a YAML file; missing keys fall back to the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::HaikuBotError::Config(format!(
                "Filter config not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config: FilterConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Write as YAML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Replace the block-list
    pub fn with_blocklist<I, S>(mut self, dids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocklist = dids.into_iter().map(Into::into).collect();
        self
    }
}

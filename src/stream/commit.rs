//! Commit notifications decoded from the relay stream

use super::StreamError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lexicon type of a feed post record
pub const FEED_POST_TYPE: &str = "app.bsky.feed.post";

/// Kind of mutation a repository operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Create,
    Update,
    Delete,
}

/// One operation inside a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoOp {
    pub action: OpAction,
    /// Slash-delimited `collection/rkey`
    pub path: String,
    /// Content hash of the new record (absent on delete)
    pub cid: Option<String>,
}

impl RepoOp {
    /// Split the path into `(collection, rkey)`
    pub fn split_path(&self) -> Option<(&str, &str)> {
        let (collection, rkey) = self.path.split_once('/')?;
        if collection.is_empty() || rkey.is_empty() {
            return None;
        }
        Some((collection, rkey))
    }
}

/// A post record (`app.bsky.feed.post`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    #[serde(rename = "$type", default = "default_post_type")]
    pub record_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<serde_json::Value>,
}

fn default_post_type() -> String {
    FEED_POST_TYPE.to_string()
}

impl FeedPost {
    /// Build a post with just text, mainly for tests and synthetic feeds
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            record_type: default_post_type(),
            text: text.into(),
            langs: Vec::new(),
            created_at: String::new(),
            reply: None,
            embed: None,
        }
    }

    /// Set language tags
    pub fn with_langs<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.langs = langs.into_iter().map(Into::into).collect();
        self
    }
}

/// A record resolved from the commit snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Post(FeedPost),
    /// Any other lexicon type, identified by its `$type`
    Other(String),
}

impl Record {
    /// Decode a record from its JSON form, dispatching on `$type`
    pub fn from_json(value: serde_json::Value) -> Result<Self, StreamError> {
        let record_type = value
            .get("$type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        if record_type == FEED_POST_TYPE {
            let post: FeedPost = serde_json::from_value(value)
                .map_err(|e| StreamError::Decode(format!("invalid post record: {}", e)))?;
            Ok(Record::Post(post))
        } else {
            Ok(Record::Other(record_type))
        }
    }
}

/// Record plus the content hash it was stored under
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub cid: String,
    pub record: Record,
}

/// One commit on the relay stream
#[derive(Debug, Clone, Default)]
pub struct CommitNotification {
    /// Stream sequence number
    pub seq: i64,
    /// DID of the repository owner
    pub repo: String,
    /// Transport marked this commit as exceeding its size limit
    pub too_big: bool,
    pub ops: Vec<RepoOp>,
    /// Decoded records keyed by path
    pub records: HashMap<String, DecodedRecord>,
}

impl CommitNotification {
    /// Create an empty commit for a repository
    pub fn new(seq: i64, repo: impl Into<String>) -> Self {
        Self {
            seq,
            repo: repo.into(),
            ..Default::default()
        }
    }

    /// Append an operation together with its decoded record
    pub fn with_record(
        mut self,
        action: OpAction,
        path: impl Into<String>,
        cid: impl Into<String>,
        record: Record,
    ) -> Self {
        let path = path.into();
        let cid = cid.into();
        self.ops.push(RepoOp {
            action,
            path: path.clone(),
            cid: Some(cid.clone()),
        });
        self.records.insert(path, DecodedRecord { cid, record });
        self
    }

    /// Append a post creation, the common case
    pub fn with_post(self, rkey: &str, post: FeedPost) -> Self {
        let path = format!("{}/{}", FEED_POST_TYPE, rkey);
        let cid = format!("bafy-{}-{}", self.seq, rkey);
        self.with_record(OpAction::Create, path, cid, Record::Post(post))
    }

    /// Resolve the record an operation refers to
    ///
    /// Fails when the snapshot lacks the path or the stored hash disagrees with the
    /// operation's hash.
    pub fn record(&self, op: &RepoOp) -> Result<&DecodedRecord, StreamError> {
        let decoded = self.records.get(&op.path).ok_or_else(|| {
            StreamError::Decode(format!(
                "record {} missing from seq {} for {}",
                op.path, self.seq, self.repo
            ))
        })?;

        if let Some(ref cid) = op.cid {
            if &decoded.cid != cid {
                return Err(StreamError::Decode(format!(
                    "mismatch in record and op cid: {} != {}",
                    decoded.cid, cid
                )));
            }
        }

        Ok(decoded)
    }
}

/// A frame read from the stream
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Commit(CommitNotification),
    Info { name: String, message: String },
    Error { error: String, message: String },
    /// Identity, account and other frames the bot has no use for
    Ignored,
}

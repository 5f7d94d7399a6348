//! Event filter
//!
//! Turns a commit notification into the candidate events worth analyzing. Runs on
//! the producer's read path, so every rule is a cheap string or regex check; the
//! expensive predicate runs later on the worker.

use crate::config::FilterConfig;
use crate::metrics;
use crate::stream::{CommitNotification, OpAction, Record, RepoOp};
use crate::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// One post worth analyzing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateEvent {
    /// Collection of the original record
    pub collection: String,
    /// DID of the author
    pub author_id: String,
    /// Record key inside the author's repository
    pub record_key: String,
    /// Raw post text
    pub text: String,
}

/// Why an operation was not turned into a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooBig,
    NotTargetType,
    Language,
    AlreadyTagged,
    NoTargetScript,
    Blocked,
    BadPath,
    Undecodable,
}

impl Rejection {
    /// Label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::TooBig => "too_big",
            Rejection::NotTargetType => "not_target_type",
            Rejection::Language => "language",
            Rejection::AlreadyTagged => "already_tagged",
            Rejection::NoTargetScript => "no_target_script",
            Rejection::Blocked => "blocked",
            Rejection::BadPath => "bad_path",
            Rejection::Undecodable => "undecodable",
        }
    }
}

/// An accepted candidate along with the record it came from (for the audit stream)
#[derive(Debug, Clone)]
pub struct Accepted {
    pub event: CandidateEvent,
    pub record: crate::stream::FeedPost,
}

/// Compiled filter rules
#[derive(Debug, Clone)]
pub struct EventFilter {
    target_collection: String,
    target_language: String,
    completion_marker: String,
    script: Regex,
    blocklist: HashSet<String>,
}

impl EventFilter {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            target_collection: config.target_collection.clone(),
            target_language: config.target_language.clone(),
            completion_marker: config.completion_marker.clone(),
            script: Regex::new(&config.script_pattern)?,
            blocklist: config.blocklist.iter().cloned().collect(),
        })
    }

    /// All candidates in a commit, in operation order
    ///
    /// Rejections are counted and, where useful, logged; they never fail the commit.
    pub fn candidates(&self, commit: &CommitNotification) -> Vec<Accepted> {
        if commit.too_big {
            info!(seq = commit.seq, "Skipping too big event");
            metrics::record_rejection(Rejection::TooBig.as_str());
            return Vec::new();
        }

        let mut accepted = Vec::new();
        for op in &commit.ops {
            match self.evaluate(commit, op) {
                Ok(candidate) => {
                    metrics::record_candidate();
                    accepted.push(candidate);
                }
                Err(rejection) => metrics::record_rejection(rejection.as_str()),
            }
        }
        accepted
    }

    /// Apply the rules to one operation, first failing rule wins
    pub fn evaluate(
        &self,
        commit: &CommitNotification,
        op: &RepoOp,
    ) -> std::result::Result<Accepted, Rejection> {
        if op.action != OpAction::Create {
            return Err(Rejection::NotTargetType);
        }
        let collection = op.path.split('/').next().unwrap_or_default();
        if collection != self.target_collection {
            return Err(Rejection::NotTargetType);
        }

        let decoded = match commit.record(op) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(seq = commit.seq, repo = %commit.repo, error = %e, "Skipping record");
                return Err(Rejection::Undecodable);
            }
        };
        let post = match &decoded.record {
            Record::Post(post) => post,
            Record::Other(_) => return Err(Rejection::NotTargetType),
        };

        if !post.langs.is_empty() && !post.langs.iter().any(|l| *l == self.target_language) {
            return Err(Rejection::Language);
        }

        if post.text.contains(&self.completion_marker) {
            return Err(Rejection::AlreadyTagged);
        }

        if !self.script.is_match(&post.text) {
            return Err(Rejection::NoTargetScript);
        }

        if self.blocklist.contains(&commit.repo) {
            warn!(repo = %commit.repo, "Blocked author");
            return Err(Rejection::Blocked);
        }

        let (collection, rkey) = op.split_path().ok_or(Rejection::BadPath)?;

        Ok(Accepted {
            event: CandidateEvent {
                collection: collection.to_string(),
                author_id: commit.repo.clone(),
                record_key: rkey.to_string(),
                text: post.text.clone(),
            },
            record: post.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FeedPost;

    const HAIKU: &str = "古池や蛙飛び込む水の音";

    fn filter() -> EventFilter {
        EventFilter::new(&FilterConfig::default()).unwrap()
    }

    fn single(commit: CommitNotification) -> std::result::Result<Accepted, Rejection> {
        let op = commit.ops[0].clone();
        filter().evaluate(&commit, &op)
    }

    #[test]
    fn test_accepts_plain_japanese_post() {
        let commit = CommitNotification::new(1, "did:plc:alice").with_post("3k2a", FeedPost::new(HAIKU));
        let accepted = single(commit).unwrap();
        assert_eq!(
            accepted.event,
            CandidateEvent {
                collection: "app.bsky.feed.post".to_string(),
                author_id: "did:plc:alice".to_string(),
                record_key: "3k2a".to_string(),
                text: HAIKU.to_string(),
            }
        );
    }

    #[test]
    fn test_completion_tag_always_rejects() {
        for text in [
            "古池や #n575 #haiku",
            "#n57577 短歌です",
            "まとめ#n575",
        ] {
            for langs in [vec![], vec!["ja"], vec!["en", "ja"]] {
                let commit = CommitNotification::new(1, "did:plc:alice")
                    .with_post("k", FeedPost::new(text).with_langs(langs));
                assert_eq!(single(commit).unwrap_err(), Rejection::AlreadyTagged);
            }
        }
    }

    #[test]
    fn test_language_mismatch_rejects() {
        let commit = CommitNotification::new(1, "did:plc:alice")
            .with_post("k", FeedPost::new(HAIKU).with_langs(["en"]));
        assert_eq!(single(commit).unwrap_err(), Rejection::Language);

        let commit = CommitNotification::new(1, "did:plc:alice")
            .with_post("k", FeedPost::new(HAIKU).with_langs(["en", "ja"]));
        assert!(single(commit).is_ok());
    }

    #[test]
    fn test_requires_target_script() {
        let commit =
            CommitNotification::new(1, "did:plc:alice").with_post("k", FeedPost::new("hello world"));
        assert_eq!(single(commit).unwrap_err(), Rejection::NoTargetScript);
    }

    #[test]
    fn test_blocklisted_author() {
        let commit = CommitNotification::new(1, "did:plc:7n2uogskixiouu4ofz3o4vdf")
            .with_post("k", FeedPost::new(HAIKU));
        assert_eq!(single(commit).unwrap_err(), Rejection::Blocked);
    }

    #[test]
    fn test_non_create_and_other_types() {
        let update = CommitNotification::new(1, "did:plc:alice").with_record(
            OpAction::Update,
            "app.bsky.feed.post/k",
            "bafy",
            Record::Post(FeedPost::new(HAIKU)),
        );
        assert_eq!(single(update).unwrap_err(), Rejection::NotTargetType);

        let like = CommitNotification::new(1, "did:plc:alice").with_record(
            OpAction::Create,
            "app.bsky.feed.like/k",
            "bafy",
            Record::Other("app.bsky.feed.like".to_string()),
        );
        assert_eq!(single(like).unwrap_err(), Rejection::NotTargetType);
    }

    #[test]
    fn test_bad_path() {
        let commit = CommitNotification::new(1, "did:plc:alice").with_record(
            OpAction::Create,
            "app.bsky.feed.post",
            "bafy",
            Record::Post(FeedPost::new(HAIKU)),
        );
        assert_eq!(single(commit).unwrap_err(), Rejection::BadPath);
    }

    #[test]
    fn test_too_big_yields_nothing() {
        let mut commit =
            CommitNotification::new(1, "did:plc:alice").with_post("k", FeedPost::new(HAIKU));
        commit.too_big = true;
        assert!(filter().candidates(&commit).is_empty());
    }

    #[test]
    fn test_bad_record_does_not_stop_batch() {
        let mut commit = CommitNotification::new(1, "did:plc:alice")
            .with_post("a", FeedPost::new("最初の投稿"))
            .with_post("b", FeedPost::new("二番目の投稿"));
        // Break the first op's hash so it fails to resolve
        commit.ops[0].cid = Some("bafy-wrong".to_string());

        let accepted = filter().candidates(&commit);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].event.record_key, "b");
    }
}

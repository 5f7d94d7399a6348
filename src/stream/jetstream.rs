//! Decoder for the relay's JSON event feed (Jetstream)
//!
//! Jetstream re-publishes the repository commit log as one JSON object per
//! websocket text message. Each commit message carries a single operation whose
//! record is already resolved, so the decoder maps it onto a one-op
//! [`CommitNotification`].

use super::commit::{CommitNotification, DecodedRecord, OpAction, Record, RepoOp, StreamFrame};
use super::StreamError;
use serde::Deserialize;
use std::collections::HashMap;

/// Default Jetstream endpoint, filtered down to post records
pub const DEFAULT_JETSTREAM_URL: &str =
    "wss://jetstream2.us-east.bsky.network/subscribe?wantedCollections=app.bsky.feed.post";

#[derive(Debug, Deserialize)]
struct JetstreamEvent {
    did: String,
    #[serde(default)]
    time_us: i64,
    kind: String,
    #[serde(default)]
    commit: Option<JetstreamCommit>,
    /// Jetstream reports subscription problems as `{"error": ..., "message": ...}`
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JetstreamCommit {
    operation: OpAction,
    collection: String,
    rkey: String,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    cid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JetstreamError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Decode one text message into a stream frame
pub fn decode_frame(text: &str) -> Result<StreamFrame, StreamError> {
    let event: JetstreamEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(parse_err) => {
            // Error frames do not carry `did`/`kind`
            if let Ok(err) = serde_json::from_str::<JetstreamError>(text) {
                return Ok(StreamFrame::Error {
                    error: err.error,
                    message: err.message,
                });
            }
            return Err(StreamError::Decode(format!(
                "invalid event ({} bytes): {}",
                text.len(),
                parse_err
            )));
        }
    };

    if let Some(error) = event.error {
        return Ok(StreamFrame::Error {
            error,
            message: event.message.unwrap_or_default(),
        });
    }

    match event.kind.as_str() {
        "commit" => {
            let commit = event.commit.ok_or_else(|| {
                StreamError::Decode(format!("commit event {} without body", event.time_us))
            })?;
            Ok(StreamFrame::Commit(into_notification(
                event.time_us,
                event.did,
                commit,
            )))
        }
        "identity" | "account" => Ok(StreamFrame::Ignored),
        other => Ok(StreamFrame::Info {
            name: other.to_string(),
            message: event.message.unwrap_or_default(),
        }),
    }
}

fn into_notification(seq: i64, repo: String, commit: JetstreamCommit) -> CommitNotification {
    let path = format!("{}/{}", commit.collection, commit.rkey);
    let mut records = HashMap::new();

    // A record that fails to decode stays out of the snapshot; resolving it
    // later reports a record-decode error for this op only.
    if let (Some(value), Some(cid)) = (commit.record, commit.cid.as_ref()) {
        match Record::from_json(value) {
            Ok(record) => {
                records.insert(
                    path.clone(),
                    DecodedRecord {
                        cid: cid.clone(),
                        record,
                    },
                );
            }
            Err(e) => {
                tracing::debug!(seq = seq, path = %path, error = %e, "Dropping undecodable record");
            }
        }
    }

    CommitNotification {
        seq,
        repo,
        too_big: false,
        ops: vec![RepoOp {
            action: commit.operation,
            path,
            cid: commit.cid,
        }],
        records,
    }
}

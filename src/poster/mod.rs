//! Action poster
//!
//! Publishes the quote-reply for a matched post: resolve the original's strong
//! reference, embed it in a new post and create that post with a bounded retry.

mod session;
mod xrpc;

pub use session::SessionManager;
pub use xrpc::{CreatedRecord, RecordWriter, Session, StrongRef, XrpcClient, XrpcError};

use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::stream::{FeedPost, FEED_POST_TYPE};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Embed type for a quoted record
pub const EMBED_RECORD_TYPE: &str = "app.bsky.embed.record";

/// Result of a post request that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted(CreatedRecord),
    /// Nothing to say after trimming
    Skipped,
}

/// Post failures, all recoverable from the worker's point of view
#[derive(Debug, Error)]
pub enum PostError {
    #[error("cannot establish session: {0}")]
    Auth(#[source] XrpcError),

    #[error("cannot get original record: {0}")]
    Reference(#[source] XrpcError),

    #[error("failed to create post after {attempts} attempts: {source}")]
    Create {
        attempts: u32,
        #[source]
        source: XrpcError,
    },

    #[error("cannot encode post: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Posts quote-replies through a [`RecordWriter`]
pub struct ActionPoster {
    writer: Arc<dyn RecordWriter>,
    sessions: SessionManager,
    retry: RetryConfig,
}

impl ActionPoster {
    pub fn new(
        writer: Arc<dyn RecordWriter>,
        handle: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(writer.clone(), handle, password),
            writer,
            retry: RetryConfig::for_posting(),
        }
    }

    /// Override the create retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Quote `author_id`'s record `collection/record_key` with `text`
    pub async fn post(
        &self,
        collection: &str,
        author_id: &str,
        record_key: &str,
        text: &str,
    ) -> Result<PostOutcome, PostError> {
        if text.trim().is_empty() {
            debug!(author = author_id, rkey = record_key, "Nothing to post");
            metrics::record_post("skipped");
            return Ok(PostOutcome::Skipped);
        }

        let result = self.publish(collection, author_id, record_key, text).await;
        match &result {
            Ok(created) => {
                info!(uri = %created.uri, author = author_id, "Posted");
                println!("{}", created.uri);
                metrics::record_post("posted");
            }
            Err(_) => metrics::record_post("failed"),
        }
        result.map(PostOutcome::Posted)
    }

    async fn publish(
        &self,
        collection: &str,
        author_id: &str,
        record_key: &str,
        text: &str,
    ) -> Result<CreatedRecord, PostError> {
        let session = self.sessions.session().await.map_err(PostError::Auth)?;

        let original = match self
            .writer
            .get_record(&session, author_id, collection, record_key)
            .await
        {
            Ok(original) => original,
            Err(e) => {
                if e.is_auth() {
                    self.sessions.invalidate().await;
                }
                return Err(PostError::Reference(e));
            }
        };

        let record = serde_json::to_value(quote_post(text, &original))?;

        let attempts = AtomicU32::new(0);
        let writer = self.writer.as_ref();
        let (session, record, counter) = (&session, &record, &attempts);
        let result = with_retry(&self.retry, "create_post", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            writer.create_record(session, FEED_POST_TYPE, record)
        })
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(source) => {
                if source.is_auth() {
                    self.sessions.invalidate().await;
                }
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(
                    attempts = attempts,
                    author = author_id,
                    rkey = record_key,
                    "Giving up on post: {}",
                    source
                );
                Err(PostError::Create { attempts, source })
            }
        }
    }
}

/// Post record quoting `original`
fn quote_post(text: &str, original: &StrongRef) -> FeedPost {
    let mut post = FeedPost::new(text);
    post.created_at = chrono::Local::now().to_rfc3339();
    post.embed = Some(serde_json::json!({
        "$type": EMBED_RECORD_TYPE,
        "record": original,
    }));
    post
}

//! XRPC client for the write endpoint
//!
//! Four calls are needed: create/refresh a session, fetch the strong reference of
//! the post being answered, and create the reply. They sit behind
//! [`RecordWriter`] so the poster can be exercised without a network.

use crate::retry::{RetryDecision, RetryableError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-request timeout for reads
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for session and create calls
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Error codes the server uses for bad or expired credentials
const AUTH_ERROR_CODES: &[&str] = &[
    "ExpiredToken",
    "InvalidToken",
    "AuthenticationRequired",
    "AuthMissing",
];

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    #[serde(default)]
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Content hash plus address of an immutable record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// Result of `com.atproto.repo.createRecord`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedRecord {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

/// Errors from the write endpoint
#[derive(Debug, Error)]
pub enum XrpcError {
    /// Credentials rejected or token no longer valid
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} returned {status}: {error}: {message}")]
    Status {
        method: String,
        status: u16,
        error: String,
        message: String,
    },

    /// The server asked us to slow down
    #[error("{method} rate limited, retry after {retry_after:?}")]
    RateLimited {
        method: String,
        retry_after: Option<Duration>,
    },

    #[error("invalid response from {method}: {reason}")]
    InvalidResponse { method: String, reason: String },
}

impl XrpcError {
    pub fn is_auth(&self) -> bool {
        matches!(self, XrpcError::Auth(_))
    }

    fn from_status(method: &str, status: u16, body: ErrorBody) -> Self {
        let error = body.error.unwrap_or_else(|| "Unknown".to_string());
        let message = body.message.unwrap_or_default();

        if status == 401 || AUTH_ERROR_CODES.contains(&error.as_str()) {
            return XrpcError::Auth(format!("{} ({}): {} {}", method, status, error, message));
        }

        XrpcError::Status {
            method: method.to_string(),
            status,
            error,
            message,
        }
    }
}

impl RetryableError for XrpcError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            // A second attempt with the same token fails the same way
            XrpcError::Auth(_) => RetryDecision::NoRetry,
            XrpcError::RateLimited {
                retry_after: Some(wait),
                ..
            } => RetryDecision::RetryAfter(*wait),
            _ => RetryDecision::Retry,
        }
    }
}

/// Error body returned by XRPC endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetRecordResponse {
    uri: String,
    #[serde(default)]
    cid: Option<String>,
}

/// Calls the poster needs from the write endpoint
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// `com.atproto.server.createSession`
    async fn create_session(&self, identifier: &str, password: &str)
        -> Result<Session, XrpcError>;

    /// `com.atproto.server.refreshSession`
    async fn refresh_session(&self, refresh_jwt: &str) -> Result<Session, XrpcError>;

    /// `com.atproto.repo.getRecord`, reduced to the strong reference
    async fn get_record(
        &self,
        session: &Session,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StrongRef, XrpcError>;

    /// `com.atproto.repo.createRecord` in the session's own repository
    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord, XrpcError>;
}

/// `Retry-After` in its delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// reqwest-backed [`RecordWriter`]
#[derive(Debug, Clone)]
pub struct XrpcClient {
    host: String,
    client: Client,
}

impl XrpcClient {
    /// Create a client for a PDS base URL such as `https://bsky.social`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.host, method)
    }

    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
        method: &str,
    ) -> Result<T, XrpcError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(XrpcError::RateLimited {
                method: method.to_string(),
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(XrpcError::from_status(method, status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| XrpcError::InvalidResponse {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl RecordWriter for XrpcClient {
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Session, XrpcError> {
        let method = "com.atproto.server.createSession";
        debug!(identifier = identifier, "Creating session");

        let response = self
            .client
            .post(self.url(method))
            .timeout(WRITE_TIMEOUT)
            .json(&serde_json::json!({
                "identifier": identifier,
                "password": password,
            }))
            .send()
            .await?;

        Self::parse(response, method).await
    }

    async fn refresh_session(&self, refresh_jwt: &str) -> Result<Session, XrpcError> {
        let method = "com.atproto.server.refreshSession";

        let response = self
            .client
            .post(self.url(method))
            .timeout(WRITE_TIMEOUT)
            .bearer_auth(refresh_jwt)
            .send()
            .await?;

        Self::parse(response, method).await
    }

    async fn get_record(
        &self,
        session: &Session,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<StrongRef, XrpcError> {
        let method = "com.atproto.repo.getRecord";

        let response = self
            .client
            .get(self.url(method))
            .timeout(GET_TIMEOUT)
            .bearer_auth(&session.access_jwt)
            .query(&[("repo", repo), ("collection", collection), ("rkey", rkey)])
            .send()
            .await?;

        let record: GetRecordResponse = Self::parse(response, method).await?;
        let cid = record.cid.ok_or_else(|| XrpcError::InvalidResponse {
            method: method.to_string(),
            reason: format!("record {} has no cid", record.uri),
        })?;

        Ok(StrongRef {
            uri: record.uri,
            cid,
        })
    }

    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord, XrpcError> {
        let method = "com.atproto.repo.createRecord";

        let response = self
            .client
            .post(self.url(method))
            .timeout(WRITE_TIMEOUT)
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": collection,
                "record": record,
            }))
            .send()
            .await?;

        Self::parse(response, method).await
    }
}

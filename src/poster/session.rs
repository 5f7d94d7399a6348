//! Cached session for the write endpoint
//!
//! A session is created on first use and reused. After the server rejects its
//! token the session is marked stale: the next caller tries the refresh token
//! first and falls back to a full login.

use super::xrpc::{RecordWriter, Session, XrpcError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    stale: bool,
}

/// Creates, caches and refreshes sessions
pub struct SessionManager {
    writer: Arc<dyn RecordWriter>,
    handle: String,
    password: String,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        writer: Arc<dyn RecordWriter>,
        handle: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            writer,
            handle: handle.into(),
            password: password.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// A usable session, establishing or refreshing one if needed
    pub async fn session(&self) -> Result<Session, XrpcError> {
        let mut state = self.state.lock().await;

        if let Some(ref current) = state.session {
            if !state.stale {
                return Ok(current.clone());
            }

            match self.writer.refresh_session(&current.refresh_jwt).await {
                Ok(refreshed) => {
                    debug!(did = %refreshed.did, "Session refreshed");
                    state.session = Some(refreshed.clone());
                    state.stale = false;
                    return Ok(refreshed);
                }
                Err(e) => debug!(error = %e, "Refresh failed, creating a new session"),
            }
        }

        let created = self
            .writer
            .create_session(&self.handle, &self.password)
            .await?;
        info!(did = %created.did, handle = %self.handle, "Session created");
        state.session = Some(created.clone());
        state.stale = false;
        Ok(created)
    }

    /// Mark the cached session as rejected by the server
    pub async fn invalidate(&self) {
        self.state.lock().await.stale = true;
    }
}

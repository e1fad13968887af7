//! Per-request execution context
//!
//! Carries the correlation id, cancellation token and optional deadline
//! of one inbound request. Clones share the same cancellation state.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;

/// Context provided to the executor and to every driver call
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with a fresh request id and no deadline
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Set the correlation id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set an absolute deadline; an earlier existing deadline wins
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this request
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The error describing why the context ended, if it has
    pub fn err(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            Some(Error::cancelled())
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Error::deadline_exceeded())
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Error::cancelled(),
                _ = tokio::time::sleep_until(deadline) => Error::deadline_exceeded(),
            },
            None => {
                self.cancel.cancelled().await;
                Error::cancelled()
            }
        }
    }
}

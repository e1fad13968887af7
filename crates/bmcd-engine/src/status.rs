//! Status message streaming
//!
//! Progress strings produced during action execution are handed to a
//! caller-owned [`StatusSink`]. The executor awaits each send before
//! producing the next message, so sinks observe messages in the order
//! they were generated.
//!
//! # Backpressure
//!
//! [`ChannelSink`] sits on a bounded queue. When the queue is full a send
//! waits up to the sink's timeout for the receiver to make room; if none
//! appears in time the message is dropped with a warning and execution
//! carries on. Messages sent after the receiver is gone are discarded.
//! A sink that nobody drains therefore slows a request down by at most
//! one timeout per message and can never stall it.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

/// Destination for ordered progress messages
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: String);
}

/// Bounded, timeout-guarded channel sink
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    send_timeout: Duration,
}

/// Create a status channel holding up to `capacity` undelivered messages
pub fn status_channel(
    capacity: usize,
    send_timeout: Duration,
) -> (ChannelSink, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx, send_timeout }, rx)
}

#[async_trait]
impl StatusSink for ChannelSink {
    async fn send(&self, message: String) {
        match self.tx.send_timeout(message, self.send_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(message)) => {
                warn!(
                    message = %message,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Dropping status message, receiver is not draining"
                );
            }
            Err(SendTimeoutError::Closed(message)) => {
                debug!(message = %message, "Status receiver closed, discarding message");
            }
        }
    }
}

/// A sink that discards everything
#[derive(Debug, Default, Clone)]
pub struct NoopSink;

#[async_trait]
impl StatusSink for NoopSink {
    async fn send(&self, _message: String) {}
}

/// A sink that keeps every message in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatusSink for CollectingSink {
    async fn send(&self, message: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

//! Downstream publishing interface

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::QueryConfig;
use crate::event::Event;

/// Errors returned when connecting a sink
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    /// The publishing pipeline refused the connection
    #[error("sink connection refused: {0}")]
    ConnectionRefused(String),

    /// The publishing pipeline has shut down
    #[error("sink closed")]
    Closed,
}

/// Event consumer shared by all query tasks
///
/// `publish` is fire-and-forget: implementations must not block the caller
/// for long and must be safe to call from several tasks at once.
pub trait Sink: Send + Sync {
    /// Hand an event to the publishing pipeline
    fn publish(&self, event: Event);
}

/// Obtains a sink for each query at startup
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Connect a sink for the given query
    async fn connect(&self, query: &QueryConfig) -> Result<Arc<dyn Sink>, SinkError>;
}

/// Sink forwarding events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl Sink for ChannelSink {
    fn publish(&self, event: Event) {
        // A closed receiver means the pipeline is shutting down.
        if self.tx.send(event).is_err() {
            debug!("event dropped, sink receiver closed");
        }
    }
}

/// Factory handing out [`ChannelSink`]s that feed a single receiver
#[derive(Debug, Clone)]
pub struct ChannelSinkFactory {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSinkFactory {
    /// Create a factory and the receiver its sinks feed
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SinkFactory for ChannelSinkFactory {
    async fn connect(&self, query: &QueryConfig) -> Result<Arc<dyn Sink>, SinkError> {
        if self.tx.is_closed() {
            return Err(SinkError::Closed);
        }
        debug!(class = %query.class, "sink connected");
        Ok(Arc::new(ChannelSink {
            tx: self.tx.clone(),
        }))
    }
}

//! Debug channel for per-frame pipeline events.
//!
//! Publishing is fire-and-forget: a sink with no subscribers, or one whose
//! subscribers lag behind, never blocks or fails the pipeline.

use futures::{stream::BoxStream, StreamExt};
use readout_types::events::PipelineEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{trace, warn};

pub trait EventSink: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn publish(&self, event: PipelineEvent) {
        (**self).publish(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn publish(&self, event: PipelineEvent) {
        (**self).publish(event)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: PipelineEvent) {}
}

/// In-process sink backed by a broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PipelineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Events published after this call. Messages a slow subscriber lagged
    /// behind on are skipped with a warning.
    pub fn subscribe(&self) -> BoxStream<'static, PipelineEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { delivered(event) })
            .boxed()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            trace!("Debug event dropped: no subscribers");
        }
    }
}

fn delivered(
    event: std::result::Result<PipelineEvent, BroadcastStreamRecvError>,
) -> Option<PipelineEvent> {
    match event {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("Debug events dropped: {}", err);
            None
        }
    }
}

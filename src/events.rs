//! Fan-out of `GenerationEvent`s to observers.
//!
//! Publishing never blocks and never fails: with no subscribers the event is
//! dropped, and slow subscribers see `Lagged` on their receiver.

use phaseforge_common::GenerationEvent;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<GenerationEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: GenerationEvent) {
        tracing::debug!(event = event.kind(), "publish");
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Serialize an event as the `{"type": ..., "data": ...}` wire shape.
pub fn to_json(event: &GenerationEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        format!(
            r#"{{"type":"Error","data":{{"message":"unserializable event: {}"}}}}"#,
            e
        )
    })
}

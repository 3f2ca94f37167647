use crate::models::ProgressEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget progress fan-out, one channel per document.
///
/// Publishing never blocks and never fails the caller: an event with no
/// subscribers is dropped, a lagging subscriber loses events, and neither
/// outcome touches the authoritative `DocumentRecord`. The publisher owns
/// its own channel map and shares nothing with the job queue, so a slow
/// subscriber cannot apply backpressure to job consumption.
///
/// Subscriptions are live-only: events emitted before `subscribe` are not
/// replayed.
#[derive(Default)]
pub struct ProgressPublisher {
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: ProgressEvent) {
        let sender = {
            let channels = self
                .channels
                .lock()
                .expect("progress channel map poisoned");
            channels.get(&event.document_id).cloned()
        };
        if let Some(sender) = sender {
            // SendError only means nobody is listening right now.
            let delivered = sender.send(event.clone()).unwrap_or(0);
            trace!(
                document_id = %event.document_id,
                progress = event.progress,
                subscribers = delivered,
                "progress event published"
            );
        }
    }

    /// Subscribe to a document's progress stream from this moment on.
    pub fn subscribe(&self, document_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self
            .channels
            .lock()
            .expect("progress channel map poisoned");
        channels
            .entry(document_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop a document's channel once its lifecycle is terminal. Existing
    /// receivers drain whatever is already buffered and then close.
    pub fn drain(&self, document_id: &str) {
        let mut channels = self
            .channels
            .lock()
            .expect("progress channel map poisoned");
        channels.remove(document_id);
    }

    pub fn subscriber_count(&self, document_id: &str) -> usize {
        let channels = self
            .channels
            .lock()
            .expect("progress channel map poisoned");
        channels
            .get(document_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;

    fn event(message: &str, progress: f32) -> ProgressEvent {
        ProgressEvent::new("doc-1", DocumentStatus::Processing, message, progress)
    }

    #[tokio::test]
    async fn subscribers_receive_events_published_after_subscription() {
        let publisher = ProgressPublisher::new();
        publisher.publish(event("before anyone listened", 0.1));

        let mut receiver = publisher.subscribe("doc-1");
        publisher.publish(event("chunking", 0.5));

        let received = receiver.recv().await.expect("event should arrive");
        assert_eq!(received.message, "chunking");
        assert_eq!(received.progress, 0.5);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let publisher = ProgressPublisher::new();
        publisher.publish(event("nobody listening", 0.2));
        assert_eq!(publisher.subscriber_count("doc-1"), 0);
    }

    #[tokio::test]
    async fn channels_are_isolated_per_document() {
        let publisher = ProgressPublisher::new();
        let mut doc_two = publisher.subscribe("doc-2");
        publisher.subscribe("doc-1");
        publisher.publish(event("doc-1 only", 0.3));

        assert!(matches!(
            doc_two.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn drain_closes_the_stream_after_buffered_events() {
        let publisher = ProgressPublisher::new();
        let mut receiver = publisher.subscribe("doc-1");
        publisher.publish(event("final", 1.0));
        publisher.drain("doc-1");

        assert_eq!(
            receiver.recv().await.expect("buffered event").message,
            "final"
        );
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}

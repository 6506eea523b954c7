//! Message buffer (C4, §4.3): a bounded FIFO between producer streams and a
//! single consumer, with an explicit four-state lifecycle layered on top of
//! a `tokio::sync::mpsc` channel (which alone only models active/closed).

use tokio::sync::{mpsc, RwLock};

use crate::error::{DpError, Result};
use crate::proto::QueryDataResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Inactive,
    Active,
    Draining,
    Terminated,
}

/// One message delivered by a sub-request stream, tagged with the
/// sub-index it came from so consumers can attribute failures.
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub sub_index: usize,
    pub response: QueryDataResponse,
}

struct Shared {
    state: RwLock<BufferState>,
}

/// Producer-side handle. Cloned once per sub-request task.
#[derive(Clone)]
pub struct BufferProducer {
    shared: std::sync::Arc<Shared>,
    tx: mpsc::Sender<BufferedMessage>,
}

impl BufferProducer {
    /// Offers a message to the buffer. Suspends while the buffer is full;
    /// fails with [`DpError::BufferClosed`] once the buffer has left the
    /// `active` state (§4.3).
    pub async fn offer(&self, msg: BufferedMessage) -> Result<()> {
        if *self.shared.state.read().await != BufferState::Active {
            return Err(DpError::BufferClosed);
        }
        self.tx.send(msg).await.map_err(|_| DpError::BufferClosed)
    }
}

/// Consumer-side handle. Owned exclusively by the single drain task (§5).
pub struct BufferConsumer {
    shared: std::sync::Arc<Shared>,
    rx: mpsc::Receiver<BufferedMessage>,
}

impl BufferConsumer {
    /// Returns the next message, or `None` once the buffer is `terminated`
    /// and empty (§4.3's end-of-stream signal).
    pub async fn poll(&mut self) -> Option<BufferedMessage> {
        self.rx.recv().await
    }
}

/// The buffer itself: owns the lifecycle state and vends producer/consumer
/// handles. `new` starts in `inactive`; callers must `activate()` before any
/// producer can successfully `offer`.
pub struct MessageBuffer {
    shared: std::sync::Arc<Shared>,
    // Held only so `producer()` can mint clones; dropped on `shutdown`/
    // `shutdown_now` so the mpsc channel actually closes once every
    // producer-side clone handed out to sub-request tasks is also dropped.
    tx: Option<mpsc::Sender<BufferedMessage>>,
    consumer: Option<BufferConsumer>,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = std::sync::Arc::new(Shared { state: RwLock::new(BufferState::Inactive) });
        Self {
            shared: shared.clone(),
            tx: Some(tx),
            consumer: Some(BufferConsumer { shared, rx }),
        }
    }

    /// `inactive -> active`. Idempotent.
    pub async fn activate(&self) {
        let mut state = self.shared.state.write().await;
        if *state == BufferState::Inactive {
            *state = BufferState::Active;
        }
    }

    /// `active -> draining`. No further offers will be accepted; the
    /// consumer keeps draining remaining items until empty, at which point
    /// the buffer becomes `terminated` (observed lazily on next `poll`).
    pub async fn shutdown(&mut self) {
        let mut state = self.shared.state.write().await;
        if *state == BufferState::Active {
            *state = BufferState::Draining;
        }
        drop(state);
        // Dropping our retained sender (producer clones held by sub-request
        // tasks still keep the channel open until they finish) lets the mpsc
        // channel close once the last clone is dropped; the consumer then
        // sees `recv() -> None`, which the assembler treats as `terminated`.
        self.tx = None;
    }

    /// `* -> terminated`, discarding any pending items immediately.
    pub async fn shutdown_now(&mut self) {
        *self.shared.state.write().await = BufferState::Terminated;
        self.tx = None;
        if let Some(consumer) = &mut self.consumer {
            consumer.rx.close();
            while consumer.rx.try_recv().is_ok() {}
        }
    }

    pub async fn state(&self) -> BufferState {
        *self.shared.state.read().await
    }

    /// Mints a new producer handle. Returns `None` once the buffer has
    /// already been shut down (there is nothing left to clone from).
    pub fn producer(&self) -> Option<BufferProducer> {
        self.tx.clone().map(|tx| BufferProducer { shared: self.shared.clone(), tx })
    }

    /// Takes the consumer handle. May only be called once; the assembler
    /// calls this right after construction to hand the handle to the drain
    /// task.
    pub fn take_consumer(&mut self) -> Option<BufferConsumer> {
        self.consumer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{query_data_response, QueryDataResponsePayload};

    fn sample_response() -> QueryDataResponse {
        QueryDataResponse {
            result: Some(query_data_response::Result::Payload(QueryDataResponsePayload { buckets: vec![] })),
        }
    }

    #[tokio::test]
    async fn offer_fails_before_activation() {
        let buffer = MessageBuffer::new(4);
        let producer = buffer.producer().unwrap();
        let err = producer
            .offer(BufferedMessage { sub_index: 0, response: sample_response() })
            .await
            .unwrap_err();
        assert!(matches!(err, DpError::BufferClosed));
    }

    #[tokio::test]
    async fn activate_then_offer_then_drain() {
        let mut buffer = MessageBuffer::new(4);
        buffer.activate().await;
        let producer = buffer.producer().unwrap();
        producer.offer(BufferedMessage { sub_index: 0, response: sample_response() }).await.unwrap();

        let mut consumer = buffer.take_consumer().unwrap();
        drop(producer);
        buffer.shutdown().await;

        let first = consumer.poll().await;
        assert!(first.is_some());
        let second = consumer.poll().await;
        assert!(second.is_none(), "consumer observes end-of-stream once drained and closed");
    }

    #[tokio::test]
    async fn shutdown_now_discards_pending_items() {
        let mut buffer = MessageBuffer::new(4);
        buffer.activate().await;
        let producer = buffer.producer().unwrap();
        producer.offer(BufferedMessage { sub_index: 0, response: sample_response() }).await.unwrap();
        buffer.shutdown_now().await;
        assert_eq!(buffer.state().await, BufferState::Terminated);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::message::ChatMessage;
use crate::plan::Plan;

/// Everything the orchestrator publishes for the caller to observe (§4.7).
/// `seq` is assigned by `MessageBus::publish`, never by the producer, so
/// ordering is guaranteed regardless of which component emits the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub seq: u64,
    pub payload: BusPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusPayload {
    PlanAnnounced(Plan),
    StepInstruction { step_index: usize, agent_name: String, instruction: String },
    AgentChunk { agent_name: String, text: String },
    AgentMessage(ChatMessage),
    ProgressSummary(String),
    SentinelObservation { step_index: usize, execution: u32, observation: String },
    FinalAnswer(String),
    Error(String),
    Cancelled,
}

/// A single-writer, multiple-observer event stream. Every subscriber gets
/// its own unbounded `async_channel` (the teacher's `team/runtime.rs` and
/// `tools/base/pub_sub.rs` both reach for this crate for internal event
/// plumbing); `publish` fans each event out to every live subscriber, so a
/// slow or absent consumer never causes another one to miss an event —
/// unlike `tokio::sync::broadcast`, which drops for a lagging receiver.
/// `seq` is a single process-wide counter shared by every subscriber,
/// giving them all the same total order.
#[derive(Clone)]
pub struct MessageBus {
    next_seq: Arc<AtomicU64>,
    subscribers: Arc<Mutex<Vec<async_channel::Sender<BusEvent>>>>,
}

pub struct BusSubscription(pub async_channel::Receiver<BusEvent>);

impl MessageBus {
    pub fn new() -> Self {
        Self { next_seq: Arc::new(AtomicU64::new(0)), subscribers: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn subscribe(&self) -> BusSubscription {
        let (tx, rx) = async_channel::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        BusSubscription(rx)
    }

    pub fn publish(&self, payload: BusPayload) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = BusEvent { seq, payload };
        let mut subscribers = self.subscribers.lock().unwrap();
        // Drop closed subscribers as we go rather than growing forever.
        subscribers.retain(|tx| tx.try_send(event.clone()).is_ok() || !tx.is_closed());
        seq
    }

    pub fn publish_error(&self, err: &OrchestratorError) -> u64 {
        self.publish(BusPayload::Error(err.to_string()))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = MessageBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        bus.publish(BusPayload::FinalAnswer("a".into()));
        bus.publish(BusPayload::FinalAnswer("b".into()));

        let first = sub1.0.recv().await.unwrap();
        let second = sub1.0.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);

        let first_other = sub2.0.recv().await.unwrap();
        assert_eq!(first_other.seq, 0);
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_earlier_events() {
        let bus = MessageBus::new();
        bus.publish(BusPayload::FinalAnswer("a".into()));
        let sub = bus.subscribe();
        bus.publish(BusPayload::FinalAnswer("b".into()));
        let event = sub.0.recv().await.unwrap();
        assert_eq!(event.seq, 1);
    }
}

//! # bus
//!
//! Per-bout, per-topic fan-out to live subscribers (broadcast overlays,
//! supervisor consoles). Each subscriber gets a bounded queue; a slow or dead
//! subscriber is evicted instead of stalling the publisher. Within one topic,
//! subscribers observe messages in publish order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::hashing;
use combat_types::EventSource;

/// Queue depth per subscriber before it is considered stalled and evicted.
const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Scope key for messages that are not bound to one bout (calibration).
pub const GLOBAL_SCOPE: &str = "*";

// ── Topics ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    CvEvents,
    JudgeEvents,
    ScoreUpdates,
    Lifecycle,
    ConfigUpdates,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CvEvents => "cv_events",
            Self::JudgeEvents => "judge_events",
            Self::ScoreUpdates => "score_updates",
            Self::Lifecycle => "lifecycle",
            Self::ConfigUpdates => "config_updates",
        }
    }

    /// Topic an admitted event publishes on, by producer. Pipeline-synthesized
    /// events ride the CV feed: they are machine detections to consumers.
    pub fn for_source(source: EventSource) -> Self {
        match source {
            EventSource::JudgeManual => Self::JudgeEvents,
            EventSource::CvSystem | EventSource::AnalyticsDerived => Self::CvEvents,
        }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    CvEvent,
    JudgeEvent,
    ScoreUpdate,
    Lifecycle,
    ConfigUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub bout_id: String,
    pub round_id: Option<String>,
    /// ISO-8601 UTC, millisecond precision
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl BusMessage {
    pub fn new(
        message_type: MessageType,
        bout_id: &str,
        round_id: Option<&str>,
        at: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            message_type,
            bout_id: bout_id.to_string(),
            round_id: round_id.map(str::to_string),
            timestamp: hashing::iso_millis(at),
            data,
        }
    }
}

// ── Bus ───────────────────────────────────────────────────────────────────────

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<(String, Topic), Vec<Subscriber>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub messages_sent: u64,
    pub subscribers_evicted: u64,
    pub active_subscribers: usize,
}

/// Handle to a subscription; drop the receiver to leave (the next publish
/// evicts the dead sink), or call `FanoutBus::unsubscribe` explicitly.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<BusMessage>,
}

#[derive(Clone, Default)]
pub struct FanoutBus {
    state: Arc<Mutex<BusState>>,
    next_id: Arc<AtomicU64>,
    messages_sent: Arc<AtomicU64>,
    subscribers_evicted: Arc<AtomicU64>,
}

impl FanoutBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, bout_id: &str, topic: Topic) -> Subscription {
        self.subscribe_with_capacity(bout_id, topic, SUBSCRIBER_QUEUE_DEPTH)
    }

    pub fn subscribe_with_capacity(&self, bout_id: &str, topic: Topic, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .subscribers
            .entry((bout_id.to_string(), topic))
            .or_default()
            .push(Subscriber { id, tx });
        info!("bus: subscriber {id} joined {}/{}", bout_id, topic.as_str());
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, subscriber_id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for subs in state.subscribers.values_mut() {
            subs.retain(|s| s.id != subscriber_id);
        }
    }

    /// Deliver to every currently-registered sink for (bout, topic). The
    /// subscriber set is snapshotted under the lock; delivery happens without
    /// it. A full or closed queue evicts the subscriber and delivery goes on.
    pub fn publish(&self, bout_id: &str, topic: Topic, message: BusMessage) {
        let snapshot: Vec<(u64, mpsc::Sender<BusMessage>)> = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.subscribers.get(&(bout_id.to_string(), topic)) {
                Some(subs) => subs.iter().map(|s| (s.id, s.tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx) in &snapshot {
            match tx.try_send(message.clone()) {
                Ok(()) => {
                    self.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    debug!("bus: evicting subscriber {id} on {}: {err}", topic.as_str());
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(subs) = state.subscribers.get_mut(&(bout_id.to_string(), topic)) {
                subs.retain(|s| !dead.contains(&s.id));
            }
            self.subscribers_evicted
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
        }
    }

    /// Publish on the global scope (calibration config updates).
    pub fn publish_global(&self, topic: Topic, message: BusMessage) {
        self.publish(GLOBAL_SCOPE, topic, message);
    }

    pub fn subscribe_global(&self, topic: Topic) -> Subscription {
        self.subscribe(GLOBAL_SCOPE, topic)
    }

    pub fn stats(&self) -> BusStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        BusStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            subscribers_evicted: self.subscribers_evicted.load(Ordering::Relaxed),
            active_subscribers: state.subscribers.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(bout: &str, i: u64) -> BusMessage {
        BusMessage::new(MessageType::CvEvent, bout, Some("r1"), Utc::now(), json!({ "seq": i }))
    }

    #[tokio::test]
    async fn delivery_is_fifo_per_topic() {
        let bus = FanoutBus::new();
        let mut sub = bus.subscribe("b1", Topic::CvEvents);
        for i in 0..5 {
            bus.publish("b1", Topic::CvEvents, msg("b1", i));
        }
        for i in 0..5 {
            let received = sub.rx.recv().await.unwrap();
            assert_eq!(received.data["seq"], i);
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = FanoutBus::new();
        let mut cv = bus.subscribe("b1", Topic::CvEvents);
        let mut judge = bus.subscribe("b1", Topic::JudgeEvents);
        bus.publish("b1", Topic::JudgeEvents, msg("b1", 7));
        assert_eq!(judge.rx.recv().await.unwrap().data["seq"], 7);
        assert!(cv.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_evicted_without_stalling() {
        let bus = FanoutBus::new();
        let _slow = bus.subscribe_with_capacity("b1", Topic::ScoreUpdates, 2);
        let mut healthy = bus.subscribe("b1", Topic::ScoreUpdates);

        for i in 0..10 {
            bus.publish("b1", Topic::ScoreUpdates, msg("b1", i));
        }
        // Healthy sink saw everything in order; slow sink is gone
        for i in 0..10 {
            assert_eq!(healthy.rx.recv().await.unwrap().data["seq"], i);
        }
        let stats = bus.stats();
        assert_eq!(stats.subscribers_evicted, 1);
        assert_eq!(stats.active_subscribers, 1);
    }

    #[tokio::test]
    async fn dropped_receiver_is_evicted_on_next_publish() {
        let bus = FanoutBus::new();
        let sub = bus.subscribe("b1", Topic::Lifecycle);
        drop(sub.rx);
        bus.publish("b1", Topic::Lifecycle, msg("b1", 0));
        assert_eq!(bus.stats().active_subscribers, 0);
    }

    #[test]
    fn source_topic_mapping() {
        assert_eq!(Topic::for_source(EventSource::JudgeManual), Topic::JudgeEvents);
        assert_eq!(Topic::for_source(EventSource::CvSystem), Topic::CvEvents);
        assert_eq!(Topic::for_source(EventSource::AnalyticsDerived), Topic::CvEvents);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Events flowing between the aggregator, the coordinator and external
/// subscribers. Replaces the original platform's ad-hoc window events with a
/// typed channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "PERFORMANCE_CHANGED")]
    PerformanceChanged(PerformanceChangedPayload),

    #[serde(rename = "RECOMPUTE_REQUESTED")]
    RecomputeRequested(RecomputeRequestedPayload),

    #[serde(rename = "RECOMMENDATIONS_REFRESHED")]
    RecommendationsRefreshed(RecommendationsRefreshedPayload),
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::PerformanceChanged(_) => "PERFORMANCE_CHANGED",
            EngineEvent::RecomputeRequested(_) => "RECOMPUTE_REQUESTED",
            EngineEvent::RecommendationsRefreshed(_) => "RECOMMENDATIONS_REFRESHED",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EngineEvent::PerformanceChanged(p) => &p.user_id,
            EngineEvent::RecomputeRequested(p) => &p.user_id,
            EngineEvent::RecommendationsRefreshed(p) => &p.user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceChangedPayload {
    pub user_id: String,
    pub topic_id: String,
    pub subject_id: String,
    pub mastery_level: f64,
    pub high_priority: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeRequestedPayload {
    pub user_id: String,
    pub high_priority: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsRefreshedPayload {
    pub user_id: String,
    pub recommendation_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event: EngineEvent,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: EngineEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            created_at: Utc::now(),
        }
    }
}

type SubscriberId = String;

struct Subscriber {
    user_id: Option<String>,
    event_types: Option<Vec<String>>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl Subscriber {
    fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(ref user_id) = self.user_id {
            if envelope.event.user_id() != user_id {
                return false;
            }
        }

        if let Some(ref event_types) = self.event_types {
            if !event_types.contains(&envelope.event.event_type().to_string()) {
                return false;
            }
        }

        true
    }
}

pub struct EventBus {
    global_sender: broadcast::Sender<EventEnvelope>,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    event_count: RwLock<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global_sender,
            subscribers: RwLock::new(HashMap::new()),
            event_count: RwLock::new(0),
        }
    }

    pub async fn publish(&self, event: EngineEvent) {
        let envelope = EventEnvelope::new(event);
        let event_type = envelope.event.event_type();
        let user_id = envelope.event.user_id().to_string();

        {
            let mut count = self.event_count.write().await;
            *count += 1;
        }

        let subscribers = self.subscribers.read().await;
        let mut sent_count = 0usize;
        for subscriber in subscribers.values() {
            if subscriber.matches(&envelope) && subscriber.sender.send(envelope.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if self.global_sender.send(envelope).is_err() {
            debug!("No global subscribers for event");
        }

        debug!(
            event_type = event_type,
            user_id = user_id,
            sent_to = sent_count,
            "Event published"
        );
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<EventEnvelope> {
        self.global_sender.subscribe()
    }

    pub async fn subscribe_filtered(
        &self,
        user_id: Option<String>,
        event_types: Option<Vec<String>>,
    ) -> (SubscriberId, broadcast::Receiver<EventEnvelope>) {
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let subscriber_id = uuid::Uuid::new_v4().to_string();

        let subscriber = Subscriber {
            user_id,
            event_types,
            sender,
        };

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(subscriber_id.clone(), subscriber);
        }

        debug!(subscriber_id = %subscriber_id, "New filtered subscription created");

        (subscriber_id, receiver)
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(subscriber_id).is_some() {
            debug!(subscriber_id = %subscriber_id, "Subscription removed");
        }
    }

    pub async fn event_count(&self) -> u64 {
        *self.event_count.read().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{
    AttemptRecord, Recommendation, RecommendationFeedback, RecommendationStatus, TopicPerformance,
};

use super::{AttemptStore, PerformanceStore};

/// In-memory store backing tests and single-process embedding. All state is
/// keyed by user so operations on different users never interact.
#[derive(Default)]
pub struct MemoryStore {
    attempts: RwLock<HashMap<String, Vec<AttemptRecord>>>,
    performances: RwLock<HashMap<String, HashMap<String, TopicPerformance>>>,
    recommendations: RwLock<Vec<Recommendation>>,
    feedback: RwLock<Vec<RecommendationFeedback>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attempt, keeping per-user history ordered by timestamp.
    /// This is the quiz-submission side of the boundary; the engine itself
    /// only reads attempts.
    pub async fn record_attempt(&self, attempt: AttemptRecord) {
        let mut attempts = self.attempts.write().await;
        let history = attempts.entry(attempt.user_id.clone()).or_default();
        let at = history.partition_point(|a| a.timestamp <= attempt.timestamp);
        history.insert(at, attempt);
    }

    pub async fn feedback_count(&self) -> usize {
        self.feedback.read().await.len()
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn fetch_attempts(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        let attempts = self.attempts.read().await;
        let history = attempts.get(user_id).cloned().unwrap_or_default();
        Ok(match topic_id {
            Some(topic) => history
                .into_iter()
                .filter(|a| a.topic_id == topic)
                .collect(),
            None => history,
        })
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn load_performance(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
    ) -> Result<Vec<TopicPerformance>, StoreError> {
        let performances = self.performances.read().await;
        let Some(by_topic) = performances.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<TopicPerformance> = match topic_id {
            Some(topic) => by_topic.get(topic).cloned().into_iter().collect(),
            None => by_topic.values().cloned().collect(),
        };
        out.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(out)
    }

    async fn save_performance(&self, performance: &TopicPerformance) -> Result<(), StoreError> {
        let mut performances = self.performances.write().await;
        performances
            .entry(performance.user_id.clone())
            .or_default()
            .insert(performance.topic_id.clone(), performance.clone());
        Ok(())
    }

    async fn load_recommendations(
        &self,
        user_id: &str,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let recommendations = self.recommendations.read().await;
        Ok(recommendations
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn save_recommendations(
        &self,
        new_recommendations: &[Recommendation],
    ) -> Result<(), StoreError> {
        let mut recommendations = self.recommendations.write().await;
        recommendations.extend_from_slice(new_recommendations);
        Ok(())
    }

    async fn find_recommendation(&self, id: &str) -> Result<Option<Recommendation>, StoreError> {
        let recommendations = self.recommendations.read().await;
        Ok(recommendations.iter().find(|r| r.id == id).cloned())
    }

    async fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
    ) -> Result<Recommendation, StoreError> {
        let mut recommendations = self.recommendations.write().await;
        let Some(rec) = recommendations.iter_mut().find(|r| r.id == id) else {
            return Err(StoreError::NotFound(format!("recommendation {id}")));
        };
        if !rec.status.can_transition(status) {
            return Err(StoreError::InvalidTransition {
                from: rec.status.as_str(),
                to: status.as_str(),
            });
        }
        rec.status = status;
        Ok(rec.clone())
    }

    async fn mark_superseded(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> Result<usize, StoreError> {
        let mut recommendations = self.recommendations.write().await;
        let mut marked = 0usize;
        for rec in recommendations.iter_mut() {
            if rec.user_id == user_id
                && !rec.superseded
                && rec.status == RecommendationStatus::Pending
                && rec
                    .topic_id
                    .as_ref()
                    .is_none_or(|t| topic_ids.contains(t))
            {
                rec.superseded = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn save_feedback(&self, feedback: &RecommendationFeedback) -> Result<(), StoreError> {
        let mut all = self.feedback.write().await;
        all.push(feedback.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::types::{Difficulty, RecommendationKind};

    fn attempt(user: &str, topic: &str, score: f64, minutes_ago: i64) -> AttemptRecord {
        AttemptRecord {
            user_id: user.to_string(),
            topic_id: topic.to_string(),
            subject_id: "math".to_string(),
            score,
            time_spent_seconds: 300,
            difficulty: Difficulty::Intermediate,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn recommendation(user: &str, topic: &str) -> Recommendation {
        Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            kind: RecommendationKind::WeakTopicReview,
            topic_id: Some(topic.to_string()),
            subject_id: Some("math".to_string()),
            title: "Review".to_string(),
            reason: "low mastery".to_string(),
            priority: 50.0,
            urgency: 40.0,
            confidence: 0.5,
            estimated_time_minutes: 15,
            status: RecommendationStatus::Pending,
            superseded: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn attempts_stay_ordered_by_timestamp() {
        let store = MemoryStore::new();
        store.record_attempt(attempt("u1", "t1", 70.0, 10)).await;
        store.record_attempt(attempt("u1", "t1", 80.0, 30)).await;
        store.record_attempt(attempt("u1", "t2", 90.0, 1)).await;

        let all = store.fetch_attempts("u1", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let topic = store.fetch_attempts("u1", Some("t1")).await.unwrap();
        assert_eq!(topic.len(), 2);
        assert_eq!(all.last().unwrap().topic_id, "t2");
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let store = MemoryStore::new();
        let rec = recommendation("u1", "t1");
        store.save_recommendations(&[rec.clone()]).await.unwrap();

        store
            .update_recommendation_status(&rec.id, RecommendationStatus::Accepted)
            .await
            .unwrap();

        let err = store
            .update_recommendation_status(&rec.id, RecommendationStatus::Dismissed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn supersede_only_touches_pending_matching_topics() {
        let store = MemoryStore::new();
        let pending = recommendation("u1", "t1");
        let mut accepted = recommendation("u1", "t1");
        accepted.status = RecommendationStatus::Accepted;
        let other_topic = recommendation("u1", "t2");
        store
            .save_recommendations(&[pending.clone(), accepted, other_topic])
            .await
            .unwrap();

        let marked = store
            .mark_superseded("u1", &["t1".to_string()])
            .await
            .unwrap();
        assert_eq!(marked, 1);

        let survivor = store.find_recommendation(&pending.id).await.unwrap().unwrap();
        assert!(survivor.superseded);
        assert_eq!(survivor.status, RecommendationStatus::Pending);
    }

    #[tokio::test]
    async fn supersede_retires_topicless_pending_recommendations() {
        let store = MemoryStore::new();
        let mut exploration = recommendation("u1", "unused");
        exploration.kind = RecommendationKind::NewTopicExploration;
        exploration.topic_id = None;
        exploration.subject_id = None;
        let mut accepted_exploration = exploration.clone();
        accepted_exploration.id = uuid::Uuid::new_v4().to_string();
        accepted_exploration.status = RecommendationStatus::Accepted;
        store
            .save_recommendations(&[exploration.clone(), accepted_exploration.clone()])
            .await
            .unwrap();

        // A regeneration for unrelated topics still retires the old
        // topic-less suggestion.
        let marked = store
            .mark_superseded("u1", &["t9".to_string()])
            .await
            .unwrap();
        assert_eq!(marked, 1);

        let retired = store
            .find_recommendation(&exploration.id)
            .await
            .unwrap()
            .unwrap();
        assert!(retired.superseded);

        let kept = store
            .find_recommendation(&accepted_exploration.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!kept.superseded);
    }
}

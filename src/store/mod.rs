mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{
    AttemptRecord, Recommendation, RecommendationFeedback, RecommendationStatus, TopicPerformance,
};

/// Read-only view of raw attempt history. Attempts are produced by quiz
/// submission outside this engine and are never mutated here.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Attempts for a user, oldest first, optionally narrowed to one topic.
    async fn fetch_attempts(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
    ) -> Result<Vec<AttemptRecord>, StoreError>;
}

/// Persistence for derived performance summaries, recommendations and
/// feedback. Injected so tests can substitute in-memory fakes.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// All summaries for a user, or just the one topic when given.
    async fn load_performance(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
    ) -> Result<Vec<TopicPerformance>, StoreError>;

    async fn save_performance(&self, performance: &TopicPerformance) -> Result<(), StoreError>;

    async fn load_recommendations(
        &self,
        user_id: &str,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<Recommendation>, StoreError>;

    async fn save_recommendations(
        &self,
        recommendations: &[Recommendation],
    ) -> Result<(), StoreError>;

    async fn find_recommendation(&self, id: &str) -> Result<Option<Recommendation>, StoreError>;

    /// Applies a status transition, enforcing the pending -> accepted|dismissed,
    /// accepted -> completed lifecycle.
    async fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
    ) -> Result<Recommendation, StoreError>;

    /// Flags earlier pending recommendations for the given topics, and any
    /// pending recommendation without a topic, as superseded. They are kept
    /// for audit history, never deleted.
    async fn mark_superseded(
        &self,
        user_id: &str,
        topic_ids: &[String],
    ) -> Result<usize, StoreError>;

    async fn save_feedback(&self, feedback: &RecommendationFeedback) -> Result<(), StoreError>;
}

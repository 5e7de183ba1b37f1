use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::event_bus::{EngineEvent, EventBus, RecomputeRequestedPayload};
use crate::engine::adaptive::AdaptiveParameterSelector;
use crate::engine::aggregator::PerformanceAggregator;
use crate::engine::coordinator::{CoordinatorStats, SyncCoordinator};
use crate::engine::dashboard::{
    self, GamificationStats, PerformanceAnalytics, SubjectMastery,
};
use crate::engine::recommender::RecommendationScorer;
use crate::engine::trend::TrendAnalyzer;
use crate::error::{EngineError, EngineResult};
use crate::store::{AttemptStore, PerformanceStore};
use crate::types::{
    AdaptiveQuizParameters, AttemptRecord, Recommendation, RecommendationFeedback,
    RecommendationStatus, TopicPerformance, TrendSnapshot,
};

/// Top-level handle wiring the aggregator, coordinator and selector over a
/// shared store and event bus. One instance serves all users.
pub struct AnalyticsEngine {
    config: EngineConfig,
    store: Arc<dyn PerformanceStore>,
    bus: Arc<EventBus>,
    aggregator: PerformanceAggregator,
    selector: AdaptiveParameterSelector,
    coordinator: Arc<SyncCoordinator>,
}

impl AnalyticsEngine {
    pub fn new(
        config: EngineConfig,
        attempts: Arc<dyn AttemptStore>,
        store: Arc<dyn PerformanceStore>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let aggregator = PerformanceAggregator::new(
            config.mastery.clone(),
            Arc::clone(&store),
            Arc::clone(&bus),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            config.sync.clone(),
            attempts,
            Arc::clone(&store),
            TrendAnalyzer::new(config.trend.clone()),
            RecommendationScorer::new(config.scoring.clone(), config.adaptive.clone()),
            Arc::clone(&bus),
        ));
        let selector = AdaptiveParameterSelector::new(config.adaptive.clone());

        Self {
            config,
            store,
            bus,
            aggregator,
            selector,
            coordinator,
        }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Starts the background task that reacts to performance-changed events.
    /// Without it, recomputation only happens lazily on reads.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        info!("Analytics engine event loop starting");
        self.coordinator.spawn_event_loop()
    }

    /// Records a quiz attempt: folds it into the topic summary and emits the
    /// change event that drives recommendation refresh.
    pub async fn ingest_attempt(
        &self,
        attempt: &AttemptRecord,
        high_priority: bool,
    ) -> EngineResult<TopicPerformance> {
        self.aggregator.update(attempt, high_priority).await
    }

    /// Requests an out-of-band recomputation for a user, e.g. after a bulk
    /// data import. Bypasses the cooldown.
    pub async fn request_recompute(&self, user_id: &str) {
        self.bus
            .publish(EngineEvent::RecomputeRequested(RecomputeRequestedPayload {
                user_id: user_id.to_string(),
                high_priority: true,
                timestamp: Utc::now(),
            }))
            .await;
    }

    pub async fn get_smart_recommendations(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Recommendation>> {
        let limit = limit.unwrap_or(self.config.scoring.default_limit);
        self.coordinator.recommendations(user_id, limit).await
    }

    pub async fn accept_recommendation(&self, id: &str) -> EngineResult<Recommendation> {
        self.transition(id, RecommendationStatus::Accepted).await
    }

    pub async fn dismiss_recommendation(
        &self,
        id: &str,
        reason: Option<&str>,
    ) -> EngineResult<Recommendation> {
        if let Some(reason) = reason {
            debug!(recommendation_id = id, reason, "Recommendation dismissed");
        }
        self.transition(id, RecommendationStatus::Dismissed).await
    }

    pub async fn complete_recommendation(&self, id: &str) -> EngineResult<Recommendation> {
        self.transition(id, RecommendationStatus::Completed).await
    }

    /// Stores user feedback on a recommendation. The recommendation must
    /// exist; ratings are 1 to 5.
    pub async fn provide_feedback(
        &self,
        feedback: &RecommendationFeedback,
    ) -> EngineResult<()> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(EngineError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }
        let found = self
            .store
            .find_recommendation(&feedback.recommendation_id)
            .await?;
        if found.is_none() {
            return Err(EngineError::NotFound(format!(
                "recommendation {}",
                feedback.recommendation_id
            )));
        }
        self.store.save_feedback(feedback).await?;
        Ok(())
    }

    pub async fn get_learning_trends(&self, user_id: &str) -> EngineResult<TrendSnapshot> {
        self.coordinator.trend_snapshot(user_id).await
    }

    /// Quiz parameters tuned to the user's standing on one topic. A topic the
    /// user has never attempted is an error, not a default.
    pub async fn get_optimal_quiz_parameters(
        &self,
        user_id: &str,
        topic_id: &str,
        session_length_hint: Option<u32>,
    ) -> EngineResult<AdaptiveQuizParameters> {
        let performance = self
            .store
            .load_performance(user_id, Some(topic_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::NotFound(format!("no performance for user {user_id} topic {topic_id}"))
            })?;
        let trend = self.coordinator.trend_snapshot(user_id).await?;
        Ok(self.selector.select(&performance, &trend, session_length_hint))
    }

    pub async fn get_performance_analytics(
        &self,
        user_id: &str,
    ) -> EngineResult<PerformanceAnalytics> {
        let performances = self.store.load_performance(user_id, None).await?;
        let trend = self.coordinator.trend_snapshot(user_id).await?;
        Ok(dashboard::performance_analytics(&performances, &trend))
    }

    pub async fn get_gamification_stats(&self, user_id: &str) -> EngineResult<GamificationStats> {
        let performances = self.store.load_performance(user_id, None).await?;
        Ok(dashboard::gamification_stats(&performances))
    }

    pub async fn get_subject_mastery(&self, user_id: &str) -> EngineResult<Vec<SubjectMastery>> {
        let performances = self.store.load_performance(user_id, None).await?;
        Ok(dashboard::subject_mastery(&performances))
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    async fn transition(
        &self,
        id: &str,
        status: RecommendationStatus,
    ) -> EngineResult<Recommendation> {
        let updated = self.store.update_recommendation_status(id, status).await?;
        info!(
            recommendation_id = id,
            status = status.as_str(),
            "Recommendation status updated"
        );
        Ok(updated)
    }
}

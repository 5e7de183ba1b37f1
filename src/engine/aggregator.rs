use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::MasteryParams;
use crate::core::event_bus::{EngineEvent, EventBus, PerformanceChangedPayload};
use crate::error::{EngineError, EngineResult};
use crate::store::PerformanceStore;
use crate::types::{AttemptRecord, TopicPerformance};

/// Folds attempt records into per-(user, topic) performance summaries and
/// publishes a change event for each accepted attempt.
pub struct PerformanceAggregator {
    params: MasteryParams,
    store: Arc<dyn PerformanceStore>,
    bus: Arc<EventBus>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PerformanceAggregator {
    pub fn new(params: MasteryParams, store: Arc<dyn PerformanceStore>, bus: Arc<EventBus>) -> Self {
        Self {
            params,
            store,
            bus,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validates the attempt, folds it into the stored summary, persists the
    /// result and emits PERFORMANCE_CHANGED. `high_priority` marks the event
    /// for cooldown bypass, e.g. immediately after an assessment.
    ///
    /// Updates for the same user are serialized; the load/fold/save sequence
    /// would otherwise lose one of two concurrent attempts.
    pub async fn update(
        &self,
        attempt: &AttemptRecord,
        high_priority: bool,
    ) -> EngineResult<TopicPerformance> {
        validate_attempt(attempt)?;

        let lock = self.user_lock(&attempt.user_id).await;
        let _guard = lock.lock().await;

        let existing = self
            .store
            .load_performance(&attempt.user_id, Some(&attempt.topic_id))
            .await?
            .into_iter()
            .next();

        let updated = apply_attempt(&self.params, existing, attempt);
        self.store.save_performance(&updated).await?;

        debug!(
            user_id = %updated.user_id,
            topic_id = %updated.topic_id,
            total_attempts = updated.total_attempts,
            mastery = updated.mastery_level,
            velocity = updated.learning_velocity,
            "Topic performance updated"
        );

        self.bus
            .publish(EngineEvent::PerformanceChanged(PerformanceChangedPayload {
                user_id: updated.user_id.clone(),
                topic_id: updated.topic_id.clone(),
                subject_id: updated.subject_id.clone(),
                mastery_level: updated.mastery_level,
                high_priority,
                timestamp: Utc::now(),
            }))
            .await;

        Ok(updated)
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Rejects malformed input outright. Out-of-range scores are never clamped.
pub fn validate_attempt(attempt: &AttemptRecord) -> EngineResult<()> {
    if attempt.user_id.is_empty() {
        return Err(EngineError::Validation("userId must not be empty".into()));
    }
    if attempt.topic_id.is_empty() {
        return Err(EngineError::Validation("topicId must not be empty".into()));
    }
    if attempt.subject_id.is_empty() {
        return Err(EngineError::Validation("subjectId must not be empty".into()));
    }
    if !attempt.score.is_finite() || !(0.0..=100.0).contains(&attempt.score) {
        return Err(EngineError::Validation(format!(
            "score {} outside 0..=100",
            attempt.score
        )));
    }
    Ok(())
}

/// Pure fold of one attempt into an optional prior summary.
pub fn apply_attempt(
    params: &MasteryParams,
    existing: Option<TopicPerformance>,
    attempt: &AttemptRecord,
) -> TopicPerformance {
    let Some(mut perf) = existing else {
        let mut recent = VecDeque::with_capacity(params.recent_window);
        recent.push_back(attempt.score);
        return TopicPerformance {
            user_id: attempt.user_id.clone(),
            topic_id: attempt.topic_id.clone(),
            subject_id: attempt.subject_id.clone(),
            total_attempts: 1,
            average_score: attempt.score,
            best_score: attempt.score,
            worst_score: attempt.score,
            mastery_level: attempt.score,
            recent_scores: recent,
            learning_velocity: 0.0,
            last_updated: attempt.timestamp,
        };
    };

    let prior_total = f64::from(perf.total_attempts);
    perf.total_attempts += 1;
    perf.average_score =
        (perf.average_score * prior_total + attempt.score) / f64::from(perf.total_attempts);
    perf.best_score = perf.best_score.max(attempt.score);
    perf.worst_score = perf.worst_score.min(attempt.score);

    perf.recent_scores.push_back(attempt.score);
    while perf.recent_scores.len() > params.recent_window {
        perf.recent_scores.pop_front();
    }

    perf.mastery_level = next_mastery(params, perf.mastery_level, perf.average_score, attempt.score);
    perf.learning_velocity = learning_velocity(&perf.recent_scores);
    perf.last_updated = attempt.timestamp;
    perf
}

/// Mastery is sticky on improvement and responsive to regression: it steps
/// toward the running average when the attempt meets the current level, and
/// decays toward the attempt score once the attempt falls below the level by
/// more than the tolerance.
fn next_mastery(params: &MasteryParams, current: f64, average: f64, score: f64) -> f64 {
    let next = if score >= current {
        let target = average.max(score);
        current + (target - current) * params.improvement_step
    } else if score < current - params.regression_tolerance {
        current * params.retain_weight + score * params.pull_weight
    } else {
        current
    };
    next.clamp(0.0, 100.0)
}

/// Recent-half vs older-half delta over the rolling window, in signed
/// percentage points. The single source of truth for velocity.
pub fn learning_velocity(recent_scores: &VecDeque<f64>) -> f64 {
    if recent_scores.len() < 4 {
        return 0.0;
    }
    let scores: Vec<f64> = recent_scores.iter().copied().collect();
    let mid = scores.len() / 2;
    let older = &scores[..mid];
    let newer = &scores[scores.len() - mid..];
    mean(newer) - mean(older)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

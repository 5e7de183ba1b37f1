use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SyncParams;
use crate::core::event_bus::{EngineEvent, EventBus, RecommendationsRefreshedPayload};
use crate::engine::recommender::RecommendationScorer;
use crate::engine::trend::TrendAnalyzer;
use crate::error::{EngineError, EngineResult};
use crate::store::{AttemptStore, PerformanceStore};
use crate::types::{Recommendation, TrendSnapshot};

/// Last-consistent derived state for one user. Swapped in atomically after a
/// successful recomputation; readers only ever see a complete snapshot.
#[derive(Clone)]
struct UserSnapshot {
    recommendations: Arc<Vec<Recommendation>>,
    trend: Arc<TrendSnapshot>,
    computed_at: Instant,
    ttl: Duration,
}

impl UserSnapshot {
    fn is_fresh(&self) -> bool {
        self.computed_at.elapsed() < self.ttl
    }
}

/// Per-user serialization point. Holding the mutex is what makes a user's
/// recomputation single-writer.
#[derive(Default)]
struct UserSyncState {
    last_completed: Option<Instant>,
}

#[derive(Debug, Default)]
struct Counters {
    events_seen: AtomicU64,
    recomputations: AtomicU64,
    throttled: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub events_seen: u64,
    pub recomputations: u64,
    pub throttled: u64,
    pub cache_hits: u64,
    pub failures: u64,
}

/// Event-driven control loop: decides when a performance change actually
/// turns into a recomputation and owns the per-user snapshot cache.
pub struct SyncCoordinator {
    params: SyncParams,
    attempts: Arc<dyn AttemptStore>,
    store: Arc<dyn PerformanceStore>,
    trend: TrendAnalyzer,
    scorer: RecommendationScorer,
    bus: Arc<EventBus>,
    snapshots: parking_lot::RwLock<HashMap<String, UserSnapshot>>,
    user_states: Mutex<HashMap<String, Arc<Mutex<UserSyncState>>>>,
    counters: Counters,
}

impl SyncCoordinator {
    pub fn new(
        params: SyncParams,
        attempts: Arc<dyn AttemptStore>,
        store: Arc<dyn PerformanceStore>,
        trend: TrendAnalyzer,
        scorer: RecommendationScorer,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            params,
            attempts,
            store,
            trend,
            scorer,
            bus,
            snapshots: parking_lot::RwLock::new(HashMap::new()),
            user_states: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Entry point for PERFORMANCE_CHANGED events and manual refresh
    /// requests. Applies the cooldown unless the request is high-priority.
    pub async fn handle_performance_changed(
        &self,
        user_id: &str,
        high_priority: bool,
    ) -> EngineResult<()> {
        self.counters.events_seen.fetch_add(1, Ordering::Relaxed);

        let state = self.user_state(user_id).await;
        let guard = state.lock().await;

        if !high_priority {
            if let Some(completed) = guard.last_completed {
                if completed.elapsed() < Duration::from_secs(self.params.cooldown_secs) {
                    self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                    debug!(user_id, "Recomputation suppressed by cooldown");
                    return Ok(());
                }
            }
        }

        self.recompute_locked(user_id, guard).await.map(|_| ())
    }

    /// Cached recommendations for a user, recomputing first when the snapshot
    /// is missing or past its TTL. On timeout the last consistent snapshot is
    /// returned when one exists.
    pub async fn recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<Recommendation>> {
        let snapshot = self.fresh_or_recompute(user_id).await?;
        let ranked: Vec<Recommendation> = snapshot.recommendations.as_ref().clone();
        Ok(self.scorer.truncate_with_diversity(ranked, limit))
    }

    /// Cached trend snapshot, same staleness discipline as recommendations.
    pub async fn trend_snapshot(&self, user_id: &str) -> EngineResult<TrendSnapshot> {
        let snapshot = self.fresh_or_recompute(user_id).await?;
        Ok(snapshot.trend.as_ref().clone())
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            events_seen: self.counters.events_seen.load(Ordering::Relaxed),
            recomputations: self.counters.recomputations.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background loop that drives recomputation off the event
    /// bus. Returns the task handle so embedders can shut it down.
    pub fn spawn_event_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut receiver = self.bus.subscribe_global();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        let request = match envelope.event {
                            EngineEvent::PerformanceChanged(p) => {
                                Some((p.user_id, p.high_priority))
                            }
                            EngineEvent::RecomputeRequested(p) => {
                                Some((p.user_id, p.high_priority))
                            }
                            EngineEvent::RecommendationsRefreshed(_) => None,
                        };
                        if let Some((user_id, high_priority)) = request {
                            if let Err(err) = coordinator
                                .handle_performance_changed(&user_id, high_priority)
                                .await
                            {
                                warn!(user_id = %user_id, error = %err, "Recomputation failed");
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event loop lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn fresh_or_recompute(&self, user_id: &str) -> EngineResult<UserSnapshot> {
        if let Some(snapshot) = self.cached(user_id) {
            if snapshot.is_fresh() {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(snapshot);
            }
            debug!(user_id, "Snapshot past TTL, recomputing on read");
        }

        let state = self.user_state(user_id).await;
        let budget = Duration::from_millis(self.params.recompute_timeout_ms);

        let attempt = tokio::time::timeout(budget, async {
            let guard = state.lock().await;
            // Another caller may have refreshed while this one waited on the
            // user lock.
            if let Some(snapshot) = self.cached(user_id) {
                if snapshot.is_fresh() {
                    return Ok(snapshot);
                }
            }
            self.recompute_locked(user_id, guard).await
        })
        .await;

        match attempt {
            Ok(result) => result,
            Err(_elapsed) => {
                // Timed out; fall back to the last consistent snapshot even
                // if stale.
                if let Some(snapshot) = self.cached(user_id) {
                    warn!(user_id, "Recomputation timed out, serving stale snapshot");
                    return Ok(snapshot);
                }
                Err(EngineError::Stale(user_id.to_string()))
            }
        }
    }

    /// The recomputation pipeline. Caller must hold the user's sync lock.
    /// On any stage failure the previous snapshot stays in place.
    async fn recompute_locked(
        &self,
        user_id: &str,
        mut guard: tokio::sync::MutexGuard<'_, UserSyncState>,
    ) -> EngineResult<UserSnapshot> {
        let started = Instant::now();
        let result = self.run_pipeline(user_id).await;

        match result {
            Ok(snapshot) => {
                self.snapshots
                    .write()
                    .insert(user_id.to_string(), snapshot.clone());
                guard.last_completed = Some(Instant::now());
                self.counters.recomputations.fetch_add(1, Ordering::Relaxed);

                info!(
                    user_id,
                    recommendations = snapshot.recommendations.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Recommendation set recomputed"
                );

                self.bus
                    .publish(EngineEvent::RecommendationsRefreshed(
                        RecommendationsRefreshedPayload {
                            user_id: user_id.to_string(),
                            recommendation_count: snapshot.recommendations.len(),
                            timestamp: Utc::now(),
                        },
                    ))
                    .await;

                Ok(snapshot)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(user_id, error = %err, "Recomputation failed, previous snapshot retained");
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, user_id: &str) -> EngineResult<UserSnapshot> {
        let history = self.attempts.fetch_attempts(user_id, None).await?;
        let trend = self.trend.analyze(user_id, &history, Utc::now());

        let performances = self.store.load_performance(user_id, None).await?;
        let recommendations = self
            .scorer
            .generate(user_id, &performances, &trend, Utc::now());

        // Supersede the previous pending generation before the new set
        // lands: re-scored topics plus any topic-less suggestion.
        let topic_ids: Vec<String> = recommendations
            .iter()
            .filter_map(|r| r.topic_id.clone())
            .collect();
        if !recommendations.is_empty() {
            let marked = self.store.mark_superseded(user_id, &topic_ids).await?;
            if marked > 0 {
                debug!(user_id, marked, "Superseded stale pending recommendations");
            }
        }
        self.store.save_recommendations(&recommendations).await?;

        Ok(UserSnapshot {
            recommendations: Arc::new(recommendations),
            trend: Arc::new(trend),
            computed_at: Instant::now(),
            ttl: self.jittered_ttl(),
        })
    }

    fn cached(&self, user_id: &str) -> Option<UserSnapshot> {
        self.snapshots.read().get(user_id).cloned()
    }

    async fn user_state(&self, user_id: &str) -> Arc<Mutex<UserSyncState>> {
        let mut states = self.user_states.lock().await;
        Arc::clone(
            states
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserSyncState::default()))),
        )
    }

    fn jittered_ttl(&self) -> Duration {
        let base_ms = (self.params.snapshot_ttl_secs * 1000) as f64;
        let ratio = self.params.ttl_jitter_ratio;
        if ratio <= 0.0 {
            return Duration::from_millis(base_ms as u64);
        }
        let mut rng = rand::rng();
        let factor = rng.random_range(1.0 - ratio..=1.0 + ratio);
        Duration::from_millis((base_ms * factor).round().max(1.0) as u64)
    }
}

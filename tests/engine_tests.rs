//! End-to-end tests for the analytics engine facade: attempt ingestion
//! through recommendation generation, the recommendation lifecycle, adaptive
//! quiz parameters and the dashboard read models.

use std::sync::Arc;

use chrono::{Duration, Utc};
use eduassist_engine::config::EngineConfig;
use eduassist_engine::error::EngineError;
use eduassist_engine::store::MemoryStore;
use eduassist_engine::types::{
    AttemptRecord, Difficulty, OverallTrend, RecommendationFeedback, RecommendationKind,
    RecommendationStatus, SessionType,
};
use eduassist_engine::AnalyticsEngine;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sync.cooldown_secs = 0;
    config.sync.snapshot_ttl_secs = 3600;
    config.sync.ttl_jitter_ratio = 0.0;
    config
}

fn engine_with_store() -> (AnalyticsEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = AnalyticsEngine::new(test_config(), store.clone(), store.clone());
    (engine, store)
}

fn attempt(topic: &str, subject: &str, score: f64, days_ago: i64) -> AttemptRecord {
    AttemptRecord {
        user_id: "user-1".to_string(),
        topic_id: topic.to_string(),
        subject_id: subject.to_string(),
        score,
        time_spent_seconds: 120,
        difficulty: Difficulty::Intermediate,
        timestamp: Utc::now() - Duration::days(days_ago),
    }
}

/// Records the raw attempt and folds it into the performance summary, the
/// same two writes a quiz submission performs.
async fn submit(engine: &AnalyticsEngine, store: &MemoryStore, record: AttemptRecord) {
    store.record_attempt(record.clone()).await;
    engine
        .ingest_attempt(&record, false)
        .await
        .expect("attempt ingestion failed");
}

#[tokio::test]
async fn weak_topic_produces_urgent_recommendation() {
    let (engine, store) = engine_with_store();

    for (score, days_ago) in [(30.0, 6), (35.0, 4), (40.0, 2)] {
        submit(&engine, &store, attempt("fractions", "math", score, days_ago)).await;
    }

    let recommendations = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    assert!(!recommendations.is_empty());

    let top = &recommendations[0];
    assert_eq!(top.kind, RecommendationKind::WeakTopicReview);
    assert_eq!(top.topic_id.as_deref(), Some("fractions"));
    assert!(top.urgency >= 70.0, "urgency was {}", top.urgency);
    assert_eq!(top.status, RecommendationStatus::Pending);
}

#[tokio::test]
async fn recommendations_are_ordered_by_priority() {
    let (engine, store) = engine_with_store();

    for (score, days_ago) in [(25.0, 5), (30.0, 3), (35.0, 1)] {
        submit(&engine, &store, attempt("fractions", "math", score, days_ago)).await;
    }
    for (score, days_ago) in [(70.0, 5), (72.0, 3), (75.0, 1)] {
        submit(&engine, &store, attempt("cells", "biology", score, days_ago)).await;
    }

    let recommendations = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    assert!(recommendations.len() >= 2);
    for pair in recommendations.windows(2) {
        assert!(pair[0].priority >= pair[1].priority);
    }
    assert_eq!(recommendations[0].topic_id.as_deref(), Some("fractions"));
}

#[tokio::test]
async fn recommendation_lifecycle_accept_then_complete() {
    let (engine, store) = engine_with_store();
    submit(&engine, &store, attempt("fractions", "math", 30.0, 1)).await;

    let recommendations = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    let id = recommendations[0].id.clone();

    let accepted = engine.accept_recommendation(&id).await.unwrap();
    assert_eq!(accepted.status, RecommendationStatus::Accepted);

    let completed = engine.complete_recommendation(&id).await.unwrap();
    assert_eq!(completed.status, RecommendationStatus::Completed);

    // Completed is terminal.
    let err = engine.dismiss_recommendation(&id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn dismiss_from_pending_is_allowed_but_not_from_dismissed() {
    let (engine, store) = engine_with_store();
    submit(&engine, &store, attempt("fractions", "math", 30.0, 1)).await;

    let recommendations = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    let id = recommendations[0].id.clone();

    let dismissed = engine
        .dismiss_recommendation(&id, Some("already reviewed this"))
        .await
        .unwrap();
    assert_eq!(dismissed.status, RecommendationStatus::Dismissed);

    let err = engine.accept_recommendation(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn feedback_requires_existing_recommendation_and_valid_rating() {
    let (engine, store) = engine_with_store();
    submit(&engine, &store, attempt("fractions", "math", 30.0, 1)).await;

    let recommendations = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    let id = recommendations[0].id.clone();

    let feedback = RecommendationFeedback {
        recommendation_id: id.clone(),
        user_id: "user-1".to_string(),
        helpful: true,
        rating: 4,
        comment: Some("good call".to_string()),
        created_at: Utc::now(),
    };
    engine.provide_feedback(&feedback).await.unwrap();
    assert_eq!(store.feedback_count().await, 1);

    let bad_rating = RecommendationFeedback {
        rating: 6,
        ..feedback.clone()
    };
    assert!(matches!(
        engine.provide_feedback(&bad_rating).await,
        Err(EngineError::Validation(_))
    ));

    let unknown = RecommendationFeedback {
        recommendation_id: "missing".to_string(),
        ..feedback
    };
    assert!(matches!(
        engine.provide_feedback(&unknown).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn new_user_gets_empty_recommendations_and_new_learner_trend() {
    let (engine, _store) = engine_with_store();

    let recommendations = engine
        .get_smart_recommendations("nobody", None)
        .await
        .unwrap();
    assert!(recommendations.is_empty());

    let trend = engine.get_learning_trends("nobody").await.unwrap();
    assert_eq!(trend.overall_trend, OverallTrend::NewLearner);
}

#[tokio::test]
async fn quiz_parameters_follow_mastery_and_reject_unknown_topics() {
    let (engine, store) = engine_with_store();

    for (score, days_ago) in [(30.0, 3), (32.0, 1)] {
        submit(&engine, &store, attempt("fractions", "math", score, days_ago)).await;
    }

    let params = engine
        .get_optimal_quiz_parameters("user-1", "fractions", None)
        .await
        .unwrap();
    assert!(params.recommended_difficulty_distribution.easy >= 60);
    assert_eq!(
        params.recommended_session_type,
        SessionType::Assessment,
        "two attempts is still assessment territory"
    );

    let err = engine
        .get_optimal_quiz_parameters("user-1", "never-studied", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn dashboard_aggregates_across_subjects() {
    let (engine, store) = engine_with_store();

    for (score, days_ago) in [(90.0, 5), (92.0, 3), (95.0, 1)] {
        submit(&engine, &store, attempt("calculus", "math", score, days_ago)).await;
    }
    for (score, days_ago) in [(40.0, 5), (42.0, 3), (45.0, 1)] {
        submit(&engine, &store, attempt("genetics", "biology", score, days_ago)).await;
    }

    let analytics = engine.get_performance_analytics("user-1").await.unwrap();
    assert_eq!(analytics.overall_stats.total_attempts, 6);
    assert_eq!(analytics.overall_stats.topics_tracked, 2);
    assert_eq!(analytics.overall_stats.subjects_tracked, 2);
    assert_eq!(analytics.subject_breakdown.len(), 2);
    assert!(!analytics.improvement_areas.is_empty());
    assert_eq!(analytics.improvement_areas[0].topic_id, "genetics");

    let subjects = engine.get_subject_mastery("user-1").await.unwrap();
    assert_eq!(subjects.len(), 2);
    let math = subjects.iter().find(|s| s.subject_id == "math").unwrap();
    let biology = subjects.iter().find(|s| s.subject_id == "biology").unwrap();
    assert!(math.mastery > biology.mastery);

    let gamification = engine.get_gamification_stats("user-1").await.unwrap();
    assert!(gamification.strong_areas.contains(&"calculus".to_string()));
}

#[tokio::test]
async fn event_loop_drives_recomputation_in_background() {
    let (engine, store) = engine_with_store();
    let handle = engine.start();

    let record = attempt("fractions", "math", 30.0, 0);
    store.record_attempt(record.clone()).await;
    engine.ingest_attempt(&record, true).await.unwrap();

    // Give the background task a moment to pick up the event.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let stats = engine.stats();
    assert!(stats.events_seen >= 1, "stats were {stats:?}");
    assert!(stats.recomputations >= 1, "stats were {stats:?}");

    handle.abort();
}

#[tokio::test]
async fn manual_recompute_request_drives_the_event_loop() {
    let (engine, store) = engine_with_store();
    let handle = engine.start();

    store
        .record_attempt(attempt("fractions", "math", 45.0, 1))
        .await;
    engine.request_recompute("user-1").await;

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let stats = engine.stats();
    assert!(stats.recomputations >= 1, "stats were {stats:?}");

    handle.abort();
}

#[tokio::test]
async fn regeneration_supersedes_pending_recommendations() {
    let mut config = test_config();
    config.sync.snapshot_ttl_secs = 0;
    let store = Arc::new(MemoryStore::new());
    let engine = AnalyticsEngine::new(config, store.clone(), store.clone());

    submit(&engine, &store, attempt("fractions", "math", 30.0, 2)).await;
    let first = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();
    let first_id = first[0].id.clone();

    submit(&engine, &store, attempt("fractions", "math", 35.0, 1)).await;
    let second = engine
        .get_smart_recommendations("user-1", None)
        .await
        .unwrap();

    // A fresh batch replaces the stale one; no recommendation is returned twice.
    assert!(second.iter().all(|r| r.id != first_id));
    assert!(second.iter().all(|r| !r.superseded));
}

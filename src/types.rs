use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of recent scores retained per topic.
pub const RECENT_SCORE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// A single quiz attempt as produced by quiz submission. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub user_id: String,
    pub topic_id: String,
    pub subject_id: String,
    pub score: f64,
    pub time_spent_seconds: u32,
    pub difficulty: Difficulty,
    pub timestamp: DateTime<Utc>,
}

/// Rolling per-(user, topic) performance summary. Upserted on every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPerformance {
    pub user_id: String,
    pub topic_id: String,
    pub subject_id: String,
    pub total_attempts: u32,
    pub average_score: f64,
    pub best_score: f64,
    pub worst_score: f64,
    pub mastery_level: f64,
    pub recent_scores: VecDeque<f64>,
    pub learning_velocity: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub quiz_count: u32,
    pub average_score: f64,
    pub subjects_studied: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrend {
    pub week_start: NaiveDate,
    pub days_active: u32,
    pub average_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
    NoRecentActivity,
    NewLearner,
}

impl OverallTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
            Self::NoRecentActivity => "no_recent_activity",
            Self::NewLearner => "new_learner",
        }
    }
}

/// Activity trend buckets for one user. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSnapshot {
    pub user_id: String,
    pub daily_trends: Vec<DailyTrend>,
    pub weekly_trends: Vec<WeeklyTrend>,
    pub total_days_active: u32,
    pub overall_trend: OverallTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    WeakTopicReview,
    DecliningTopicIntervention,
    StaleTopicRefresh,
    NewTopicExploration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Accepted,
    Dismissed,
    Completed,
}

impl RecommendationStatus {
    /// Allowed transitions: pending -> accepted | dismissed, accepted -> completed.
    pub fn can_transition(self, next: RecommendationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Dismissed)
                | (Self::Accepted, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
            Self::Completed => "completed",
        }
    }
}

/// A scored study recommendation. Persisted; status is the only mutable field
/// apart from the superseded flag set on regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub user_id: String,
    pub kind: RecommendationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub title: String,
    pub reason: String,
    pub priority: f64,
    pub urgency: f64,
    pub confidence: f64,
    pub estimated_time_minutes: u32,
    pub status: RecommendationStatus,
    pub superseded: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Practice,
    Assessment,
    Adaptive,
    Challenge,
}

/// Three-bucket percentage split. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyDistribution {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl DifficultyDistribution {
    pub fn total(&self) -> u32 {
        self.easy + self.medium + self.hard
    }
}

/// Quiz generation parameters tailored to one learner on one topic.
/// Computed fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveQuizParameters {
    pub recommended_question_count: u32,
    pub recommended_difficulty_distribution: DifficultyDistribution,
    pub recommended_session_type: SessionType,
    pub user_level: f64,
    pub mastery_score: f64,
    pub recommendation_reason: String,
}

/// Learner feedback on a recommendation. Recorded for future weight tuning,
/// never used to rescore past output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationFeedback {
    pub recommendation_id: String,
    pub user_id: String,
    pub helpful: bool,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};

/// Mastery smoothing and rolling-window parameters for the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryParams {
    /// Capacity of the recent-score FIFO.
    pub recent_window: usize,
    /// Weight kept from the current mastery when a regression pulls it down.
    pub retain_weight: f64,
    /// Weight of the regressing attempt score.
    pub pull_weight: f64,
    /// Points below current mastery an attempt must fall before decay kicks in.
    pub regression_tolerance: f64,
    /// Smoothing step toward the running average on improvement.
    pub improvement_step: f64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            recent_window: 8,
            retain_weight: 0.7,
            pull_weight: 0.3,
            regression_tolerance: 5.0,
            improvement_step: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendParams {
    /// Below this many lifetime attempts a user is classified as new_learner.
    pub min_samples: u32,
    /// Days without any attempt before no_recent_activity.
    pub inactivity_days: i64,
    /// Weekly-average delta below which the trend is stable.
    pub noise_threshold: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            min_samples: 5,
            inactivity_days: 14,
            noise_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Mastery level the priority gap is measured against.
    pub target_mastery: f64,
    /// Average score below which urgency is forced to at least 70.
    pub weak_threshold: f64,
    /// Attempt count at which confidence saturates at 1.0.
    pub confidence_saturation: u32,
    /// Upper bound on the not-attempted-recently priority boost.
    pub staleness_boost_cap: f64,
    /// Upper bound on the negative-velocity priority boost.
    pub regression_boost_cap: f64,
    pub minutes_per_question: f64,
    /// Maximum share of a truncated result a single subject may occupy.
    pub subject_share: f64,
    pub default_limit: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            target_mastery: 80.0,
            weak_threshold: 50.0,
            confidence_saturation: 10,
            staleness_boost_cap: 15.0,
            regression_boost_cap: 15.0,
            minutes_per_question: 1.5,
            subject_share: 0.4,
            default_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveParams {
    pub base_question_count: u32,
    pub min_question_count: u32,
    pub max_question_count: u32,
    /// Below this many attempts the session establishes a baseline.
    pub low_attempt_threshold: u32,
    /// |velocity| beyond which the difficulty mix is nudged a step.
    pub strong_velocity: f64,
    /// |velocity| beyond which the session type becomes adaptive.
    pub volatile_velocity: f64,
    /// Mastery above which an improving learner gets a challenge session.
    pub challenge_mastery: f64,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            base_question_count: 10,
            min_question_count: 5,
            max_question_count: 30,
            low_attempt_threshold: 3,
            strong_velocity: 10.0,
            volatile_velocity: 15.0,
            challenge_mastery: 75.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncParams {
    /// Seconds a completed recomputation suppresses the next one.
    pub cooldown_secs: u64,
    /// Seconds a cached snapshot stays fresh.
    pub snapshot_ttl_secs: u64,
    /// Default wall-clock budget for a recomputation before the caller
    /// falls back to cached data.
    pub recompute_timeout_ms: u64,
    /// Jitter applied to the snapshot TTL to avoid synchronized expiry.
    pub ttl_jitter_ratio: f64,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            snapshot_ttl_secs: 3600,
            recompute_timeout_ms: 2_000,
            ttl_jitter_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mastery: MasteryParams,
    pub trend: TrendParams,
    pub scoring: ScoringParams,
    pub adaptive: AdaptiveParams,
    pub sync: SyncParams,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ENGINE_TARGET_MASTERY") {
            if let Ok(parsed) = val.parse::<f64>() {
                config.scoring.target_mastery = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_WEAK_THRESHOLD") {
            if let Ok(parsed) = val.parse::<f64>() {
                config.scoring.weak_threshold = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_SYNC_COOLDOWN_SECS") {
            if let Ok(parsed) = val.parse::<u64>() {
                config.sync.cooldown_secs = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_SNAPSHOT_TTL_SECS") {
            if let Ok(parsed) = val.parse::<u64>() {
                config.sync.snapshot_ttl_secs = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_INACTIVITY_DAYS") {
            if let Ok(parsed) = val.parse::<i64>() {
                config.trend.inactivity_days = parsed;
            }
        }

        config
    }
}

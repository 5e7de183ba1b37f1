use crate::config::AdaptiveParams;
use crate::types::{
    AdaptiveQuizParameters, DifficultyDistribution, OverallTrend, SessionType, TopicPerformance,
    TrendSnapshot,
};

/// Chooses quiz generation parameters for one learner on one topic. Pure:
/// identical inputs always produce identical output.
pub struct AdaptiveParameterSelector {
    params: AdaptiveParams,
}

impl AdaptiveParameterSelector {
    pub fn new(params: AdaptiveParams) -> Self {
        Self { params }
    }

    pub fn select(
        &self,
        performance: &TopicPerformance,
        trend: &TrendSnapshot,
        session_length_hint: Option<u32>,
    ) -> AdaptiveQuizParameters {
        let mastery = performance.mastery_level;
        let velocity = performance.learning_velocity;

        let distribution = self.difficulty_distribution(mastery, velocity);
        let question_count = self.question_count(performance, session_length_hint);
        let session_type = self.session_type(performance, trend);
        let reason = self.reason(performance, trend, session_type);

        AdaptiveQuizParameters {
            recommended_question_count: question_count,
            recommended_difficulty_distribution: distribution,
            recommended_session_type: session_type,
            user_level: mastery,
            mastery_score: mastery,
            recommendation_reason: reason,
        }
    }

    /// Fixed mastery breakpoints, then a one-step nudge toward harder or
    /// easier buckets when velocity is strong, renormalized to exactly 100.
    fn difficulty_distribution(&self, mastery: f64, velocity: f64) -> DifficultyDistribution {
        let base = if mastery < 40.0 {
            DifficultyDistribution { easy: 70, medium: 25, hard: 5 }
        } else if mastery <= 70.0 {
            DifficultyDistribution { easy: 30, medium: 50, hard: 20 }
        } else {
            DifficultyDistribution { easy: 10, medium: 40, hard: 50 }
        };

        let nudged = if velocity > self.params.strong_velocity {
            shift_harder(base)
        } else if velocity < -self.params.strong_velocity {
            shift_easier(base)
        } else {
            base
        };

        renormalize(nudged)
    }

    fn question_count(&self, performance: &TopicPerformance, hint: Option<u32>) -> u32 {
        let mut count = self.params.base_question_count;
        // Thin history needs more signal per session.
        if performance.total_attempts < self.params.low_attempt_threshold {
            count += 5;
        }
        if let Some(hint_count) = hint {
            count = count.min(hint_count);
        }
        count.clamp(self.params.min_question_count, self.params.max_question_count)
    }

    fn session_type(&self, performance: &TopicPerformance, trend: &TrendSnapshot) -> SessionType {
        if performance.total_attempts < self.params.low_attempt_threshold {
            SessionType::Assessment
        } else if performance.mastery_level > self.params.challenge_mastery
            && trend.overall_trend == OverallTrend::Improving
        {
            SessionType::Challenge
        } else if performance.learning_velocity.abs() > self.params.volatile_velocity {
            SessionType::Adaptive
        } else {
            SessionType::Practice
        }
    }

    fn reason(
        &self,
        performance: &TopicPerformance,
        trend: &TrendSnapshot,
        session_type: SessionType,
    ) -> String {
        match session_type {
            SessionType::Assessment => format!(
                "Only {} attempt(s) recorded; assessing to establish a baseline",
                performance.total_attempts
            ),
            SessionType::Challenge => format!(
                "Mastery at {:.0}% with an improving trend; raising the bar",
                performance.mastery_level
            ),
            SessionType::Adaptive => format!(
                "Recent performance is volatile ({:+.0} points); adapting difficulty in-session",
                performance.learning_velocity
            ),
            SessionType::Practice => format!(
                "Mastery at {:.0}%, trend {}; steady practice recommended",
                performance.mastery_level,
                trend.overall_trend.as_str()
            ),
        }
    }
}

impl Default for AdaptiveParameterSelector {
    fn default() -> Self {
        Self::new(AdaptiveParams::default())
    }
}

const NUDGE: u32 = 10;

fn shift_harder(d: DifficultyDistribution) -> DifficultyDistribution {
    let moved = d.easy.min(NUDGE);
    DifficultyDistribution {
        easy: d.easy - moved,
        medium: d.medium,
        hard: d.hard + moved,
    }
}

fn shift_easier(d: DifficultyDistribution) -> DifficultyDistribution {
    let moved = d.hard.min(NUDGE);
    DifficultyDistribution {
        easy: d.easy + moved,
        medium: d.medium,
        hard: d.hard - moved,
    }
}

/// Forces the split to sum to exactly 100 by settling any remainder on the
/// medium bucket.
fn renormalize(d: DifficultyDistribution) -> DifficultyDistribution {
    let total = d.total();
    if total == 100 {
        return d;
    }
    let medium = (i64::from(d.medium) + (100 - i64::from(total))).max(0) as u32;
    DifficultyDistribution {
        easy: d.easy,
        medium,
        hard: d.hard,
    }
}

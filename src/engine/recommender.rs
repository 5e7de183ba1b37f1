use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::{AdaptiveParams, ScoringParams};
use crate::types::{
    OverallTrend, Recommendation, RecommendationKind, RecommendationStatus, TopicPerformance,
    TrendSnapshot,
};

/// Velocity drop below which a topic counts as actively declining.
const VELOCITY_NOISE_FLOOR: f64 = 5.0;

/// Scores and ranks study recommendations from aggregated performance and
/// trend output. Each call is a fresh computation; nothing is cached here.
pub struct RecommendationScorer {
    params: ScoringParams,
    adaptive: AdaptiveParams,
}

impl RecommendationScorer {
    pub fn new(params: ScoringParams, adaptive: AdaptiveParams) -> Self {
        Self { params, adaptive }
    }

    /// Produces one candidate per topic plus, for learners with every topic
    /// at target and an improving trend, an exploration suggestion. Output is
    /// fully sorted by the priority/urgency/confidence/topic chain.
    pub fn generate(
        &self,
        user_id: &str,
        performances: &[TopicPerformance],
        trend: &TrendSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let mut out: Vec<Recommendation> = performances
            .iter()
            .map(|perf| self.score_topic(user_id, perf, now))
            .collect();

        if let Some(exploration) = self.exploration_candidate(user_id, performances, trend, now) {
            out.push(exploration);
        }

        sort_ranked(&mut out);
        out
    }

    fn score_topic(
        &self,
        user_id: &str,
        perf: &TopicPerformance,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let priority = self.priority(perf, now);
        let urgency = self.urgency(perf);
        let confidence = self.confidence(perf);
        let question_count = self.question_count(perf);
        let estimated_time_minutes =
            (f64::from(question_count) * self.params.minutes_per_question).ceil() as u32;

        let kind = self.kind_for(perf, now);
        let (title, reason) = self.describe(perf, kind);

        Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            topic_id: Some(perf.topic_id.clone()),
            subject_id: Some(perf.subject_id.clone()),
            title,
            reason,
            priority,
            urgency,
            confidence,
            estimated_time_minutes,
            status: RecommendationStatus::Pending,
            superseded: false,
            created_at: now,
        }
    }

    /// Mastery gap drives priority; regression and staleness add capped
    /// boosts on top.
    fn priority(&self, perf: &TopicPerformance, now: DateTime<Utc>) -> f64 {
        let gap = (self.params.target_mastery - perf.mastery_level).max(0.0);
        let gap_component = gap / self.params.target_mastery * 70.0;

        let regression_boost = if perf.learning_velocity < 0.0 {
            (-perf.learning_velocity * 0.5).min(self.params.regression_boost_cap)
        } else {
            0.0
        };

        let idle_days = (now - perf.last_updated).num_days().max(0) as f64;
        let staleness_boost = (idle_days * 1.5).min(self.params.staleness_boost_cap);

        (gap_component + regression_boost + staleness_boost).clamp(0.0, 100.0)
    }

    /// Topics below the weak threshold are always urgent (>= 70); otherwise
    /// urgency tracks how recent and steep the decline is.
    fn urgency(&self, perf: &TopicPerformance) -> f64 {
        if perf.average_score < self.params.weak_threshold {
            let deficit = self.params.weak_threshold - perf.average_score;
            return (70.0 + deficit / self.params.weak_threshold * 30.0).clamp(70.0, 100.0);
        }

        let decline = if perf.learning_velocity < 0.0 {
            (-perf.learning_velocity * 2.0).min(60.0)
        } else {
            0.0
        };
        let margin = (perf.average_score - self.params.weak_threshold).max(0.0);
        (decline + (20.0 - margin * 0.4).max(0.0)).clamp(0.0, 69.0)
    }

    /// Sample-count confidence, saturating, discounted by recent-score spread.
    fn confidence(&self, perf: &TopicPerformance) -> f64 {
        let base = (f64::from(perf.total_attempts)
            / f64::from(self.params.confidence_saturation))
        .min(1.0);
        let spread_penalty = (recent_std_dev(perf) / 50.0).min(0.5);
        (base * (1.0 - spread_penalty)).clamp(0.0, 1.0)
    }

    /// Mirrors the adaptive selector's count rule so estimated time lines up
    /// with what a generated session would actually contain.
    fn question_count(&self, perf: &TopicPerformance) -> u32 {
        let mut count = self.adaptive.base_question_count;
        if perf.total_attempts < self.adaptive.low_attempt_threshold {
            count += 5;
        }
        count.clamp(
            self.adaptive.min_question_count,
            self.adaptive.max_question_count,
        )
    }

    fn kind_for(&self, perf: &TopicPerformance, now: DateTime<Utc>) -> RecommendationKind {
        if perf.average_score < self.params.weak_threshold {
            RecommendationKind::WeakTopicReview
        } else if perf.learning_velocity < -VELOCITY_NOISE_FLOOR {
            RecommendationKind::DecliningTopicIntervention
        } else if (now - perf.last_updated).num_days() >= 7 {
            RecommendationKind::StaleTopicRefresh
        } else {
            RecommendationKind::WeakTopicReview
        }
    }

    fn describe(&self, perf: &TopicPerformance, kind: RecommendationKind) -> (String, String) {
        match kind {
            RecommendationKind::WeakTopicReview => (
                format!("Review {}", perf.topic_id),
                format!(
                    "Average score {:.0}% with mastery at {:.0}%; focused review will close the gap",
                    perf.average_score, perf.mastery_level
                ),
            ),
            RecommendationKind::DecliningTopicIntervention => (
                format!("Reinforce {}", perf.topic_id),
                format!(
                    "Recent scores dropped {:.0} points; a short session now prevents further slide",
                    -perf.learning_velocity
                ),
            ),
            RecommendationKind::StaleTopicRefresh => (
                format!("Refresh {}", perf.topic_id),
                "No recent practice on this topic; a refresher keeps it durable".to_string(),
            ),
            RecommendationKind::NewTopicExploration => (
                "Explore a new topic".to_string(),
                "All tracked topics are at target; time to broaden".to_string(),
            ),
        }
    }

    fn exploration_candidate(
        &self,
        user_id: &str,
        performances: &[TopicPerformance],
        trend: &TrendSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Recommendation> {
        if performances.is_empty()
            || trend.overall_trend != OverallTrend::Improving
            || performances
                .iter()
                .any(|p| p.mastery_level < self.params.target_mastery)
        {
            return None;
        }

        let (title, reason) = self.describe(
            &performances[0],
            RecommendationKind::NewTopicExploration,
        );
        Some(Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: RecommendationKind::NewTopicExploration,
            topic_id: None,
            subject_id: None,
            title,
            reason,
            priority: 40.0,
            urgency: 10.0,
            confidence: 0.8,
            estimated_time_minutes: (f64::from(self.adaptive.base_question_count)
                * self.params.minutes_per_question)
                .ceil() as u32,
            status: RecommendationStatus::Pending,
            superseded: false,
            created_at: now,
        })
    }

    /// Greedy truncation that caps any single subject's share of the result
    /// while other subjects still have eligible candidates. Relative order of
    /// same-subject items is preserved.
    pub fn truncate_with_diversity(
        &self,
        ranked: Vec<Recommendation>,
        limit: usize,
    ) -> Vec<Recommendation> {
        if ranked.len() <= limit {
            return ranked;
        }

        let cap = ((limit as f64) * self.params.subject_share).ceil().max(1.0) as usize;
        let mut per_subject: HashMap<&str, usize> = HashMap::new();
        let mut selected: Vec<usize> = Vec::with_capacity(limit);
        let mut skipped: Vec<usize> = Vec::new();

        for (idx, rec) in ranked.iter().enumerate() {
            if selected.len() == limit {
                break;
            }
            let subject = rec.subject_id.as_deref().unwrap_or("");
            let count = per_subject.entry(subject).or_insert(0);
            if *count < cap {
                *count += 1;
                selected.push(idx);
            } else {
                skipped.push(idx);
            }
        }

        // Backfill from over-cap candidates when the remaining pool could not
        // fill the limit, keeping rank order.
        for idx in skipped {
            if selected.len() == limit {
                break;
            }
            selected.push(idx);
        }
        selected.sort_unstable();

        let mut keep: Vec<Recommendation> = Vec::with_capacity(selected.len());
        let mut iter = selected.into_iter().peekable();
        for (idx, rec) in ranked.into_iter().enumerate() {
            if iter.peek() == Some(&idx) {
                iter.next();
                keep.push(rec);
            }
        }
        keep
    }
}

/// Sort contract: priority desc, urgency desc, confidence desc, topic id asc.
pub fn sort_ranked(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.urgency.partial_cmp(&a.urgency).unwrap_or(Ordering::Equal))
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
}

fn recent_std_dev(perf: &TopicPerformance) -> f64 {
    let n = perf.recent_scores.len();
    if n < 2 {
        return 0.0;
    }
    let mean = perf.recent_scores.iter().sum::<f64>() / n as f64;
    let variance = perf
        .recent_scores
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    variance.sqrt()
}

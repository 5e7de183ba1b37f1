use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{TopicPerformance, TrendSnapshot, WeeklyTrend};

/// How many topics dashboards list as improvement areas / weak areas.
const AREA_LIMIT: usize = 3;
/// Mastery at or above this marks a strong area for gamification.
const STRONG_AREA_MASTERY: f64 = 80.0;
/// Mastery below this marks a weak area.
const WEAK_AREA_MASTERY: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_attempts: u32,
    pub average_score: f64,
    pub average_mastery: f64,
    pub topics_tracked: u32,
    pub subjects_tracked: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectBreakdown {
    pub subject_id: String,
    pub topic_count: u32,
    pub total_attempts: u32,
    pub average_score: f64,
    pub average_mastery: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementArea {
    pub topic_id: String,
    pub subject_id: String,
    pub mastery_level: f64,
    pub learning_velocity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAnalytics {
    pub overall_stats: OverallStats,
    pub subject_breakdown: Vec<SubjectBreakdown>,
    pub weekly_trend: Vec<WeeklyTrend>,
    pub improvement_areas: Vec<ImprovementArea>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationStats {
    pub average_mastery: f64,
    pub strong_areas: Vec<String>,
    pub weak_areas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMastery {
    pub subject_id: String,
    pub mastery: f64,
    pub topic_count: u32,
}

/// Assembles the dashboard analytics payload from stored summaries and the
/// coordinator's trend snapshot.
pub fn performance_analytics(
    performances: &[TopicPerformance],
    trend: &TrendSnapshot,
) -> PerformanceAnalytics {
    PerformanceAnalytics {
        overall_stats: overall_stats(performances),
        subject_breakdown: subject_breakdown(performances),
        weekly_trend: trend.weekly_trends.clone(),
        improvement_areas: improvement_areas(performances),
    }
}

pub fn gamification_stats(performances: &[TopicPerformance]) -> GamificationStats {
    let average_mastery = mean(performances.iter().map(|p| p.mastery_level));

    let mut by_mastery: Vec<&TopicPerformance> = performances.iter().collect();
    by_mastery.sort_by(|a, b| {
        b.mastery_level
            .partial_cmp(&a.mastery_level)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });

    let strong_areas = by_mastery
        .iter()
        .filter(|p| p.mastery_level >= STRONG_AREA_MASTERY)
        .take(AREA_LIMIT)
        .map(|p| p.topic_id.clone())
        .collect();
    let weak_areas = by_mastery
        .iter()
        .rev()
        .filter(|p| p.mastery_level < WEAK_AREA_MASTERY)
        .take(AREA_LIMIT)
        .map(|p| p.topic_id.clone())
        .collect();

    GamificationStats {
        average_mastery,
        strong_areas,
        weak_areas,
    }
}

pub fn subject_mastery(performances: &[TopicPerformance]) -> Vec<SubjectMastery> {
    let mut subjects: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for perf in performances {
        let entry = subjects.entry(perf.subject_id.as_str()).or_insert((0.0, 0));
        entry.0 += perf.mastery_level;
        entry.1 += 1;
    }
    subjects
        .into_iter()
        .map(|(subject_id, (mastery_sum, count))| SubjectMastery {
            subject_id: subject_id.to_string(),
            mastery: mastery_sum / f64::from(count),
            topic_count: count,
        })
        .collect()
}

fn overall_stats(performances: &[TopicPerformance]) -> OverallStats {
    let total_attempts = performances.iter().map(|p| p.total_attempts).sum();
    let subjects: std::collections::HashSet<&str> =
        performances.iter().map(|p| p.subject_id.as_str()).collect();

    OverallStats {
        total_attempts,
        average_score: weighted_average_score(performances),
        average_mastery: mean(performances.iter().map(|p| p.mastery_level)),
        topics_tracked: performances.len() as u32,
        subjects_tracked: subjects.len() as u32,
    }
}

fn subject_breakdown(performances: &[TopicPerformance]) -> Vec<SubjectBreakdown> {
    let mut subjects: BTreeMap<&str, Vec<&TopicPerformance>> = BTreeMap::new();
    for perf in performances {
        subjects.entry(perf.subject_id.as_str()).or_default().push(perf);
    }
    subjects
        .into_iter()
        .map(|(subject_id, topics)| SubjectBreakdown {
            subject_id: subject_id.to_string(),
            topic_count: topics.len() as u32,
            total_attempts: topics.iter().map(|p| p.total_attempts).sum(),
            average_score: weighted_average_score_refs(&topics),
            average_mastery: mean(topics.iter().map(|p| p.mastery_level)),
        })
        .collect()
}

/// Topics with the lowest mastery first; a negative velocity breaks ties
/// toward whichever topic is actively slipping.
fn improvement_areas(performances: &[TopicPerformance]) -> Vec<ImprovementArea> {
    let mut candidates: Vec<&TopicPerformance> = performances.iter().collect();
    candidates.sort_by(|a, b| {
        a.mastery_level
            .partial_cmp(&b.mastery_level)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.learning_velocity
                    .partial_cmp(&b.learning_velocity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    candidates
        .into_iter()
        .take(AREA_LIMIT)
        .map(|p| ImprovementArea {
            topic_id: p.topic_id.clone(),
            subject_id: p.subject_id.clone(),
            mastery_level: p.mastery_level,
            learning_velocity: p.learning_velocity,
        })
        .collect()
}

/// Attempt-weighted mean of per-topic averages; an unweighted mean would let
/// a single-attempt topic swing the headline number.
fn weighted_average_score(performances: &[TopicPerformance]) -> f64 {
    let total: u32 = performances.iter().map(|p| p.total_attempts).sum();
    if total == 0 {
        return 0.0;
    }
    performances
        .iter()
        .map(|p| p.average_score * f64::from(p.total_attempts))
        .sum::<f64>()
        / f64::from(total)
}

fn weighted_average_score_refs(performances: &[&TopicPerformance]) -> f64 {
    let total: u32 = performances.iter().map(|p| p.total_attempts).sum();
    if total == 0 {
        return 0.0;
    }
    performances
        .iter()
        .map(|p| p.average_score * f64::from(p.total_attempts))
        .sum::<f64>()
        / f64::from(total)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

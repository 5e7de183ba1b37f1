use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::config::TrendParams;
use crate::types::{AttemptRecord, DailyTrend, OverallTrend, TrendSnapshot, WeeklyTrend};

/// Buckets a user's attempt history into daily and weekly activity trends
/// and classifies the overall direction. Pure given the history and a
/// reference instant.
pub struct TrendAnalyzer {
    params: TrendParams,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    /// `history` must be chronological; `now` anchors the inactivity check so
    /// the classification is reproducible in tests.
    pub fn analyze(
        &self,
        user_id: &str,
        history: &[AttemptRecord],
        now: DateTime<Utc>,
    ) -> TrendSnapshot {
        let daily_trends = bucket_daily(history);
        let weekly_trends = bucket_weekly(&daily_trends, history);
        let total_days_active = daily_trends.len() as u32;
        let overall_trend = self.classify(history, &weekly_trends, now);

        TrendSnapshot {
            user_id: user_id.to_string(),
            daily_trends,
            weekly_trends,
            total_days_active,
            overall_trend,
        }
    }

    /// Classification priority: new_learner, no_recent_activity,
    /// insufficient_data, then the weekly-average comparison.
    fn classify(
        &self,
        history: &[AttemptRecord],
        weekly: &[WeeklyTrend],
        now: DateTime<Utc>,
    ) -> OverallTrend {
        if (history.len() as u32) < self.params.min_samples {
            return OverallTrend::NewLearner;
        }

        let latest = history
            .last()
            .map(|a| a.timestamp)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if now - latest > Duration::days(self.params.inactivity_days) {
            return OverallTrend::NoRecentActivity;
        }

        let active: Vec<&WeeklyTrend> = weekly.iter().filter(|w| w.days_active > 0).collect();
        if active.len() < 2 {
            return OverallTrend::InsufficientData;
        }

        let current = active[active.len() - 1].average_score;
        let previous = active[active.len() - 2].average_score;
        let delta = current - previous;

        if delta > self.params.noise_threshold {
            OverallTrend::Improving
        } else if delta < -self.params.noise_threshold {
            OverallTrend::Declining
        } else {
            OverallTrend::Stable
        }
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

fn bucket_daily(history: &[AttemptRecord]) -> Vec<DailyTrend> {
    let mut days: BTreeMap<NaiveDate, (u32, f64, HashSet<&str>)> = BTreeMap::new();
    for attempt in history {
        let date = attempt.timestamp.date_naive();
        let entry = days.entry(date).or_insert_with(|| (0, 0.0, HashSet::new()));
        entry.0 += 1;
        entry.1 += attempt.score;
        entry.2.insert(attempt.subject_id.as_str());
    }

    days.into_iter()
        .map(|(date, (count, score_sum, subjects))| DailyTrend {
            date,
            quiz_count: count,
            average_score: score_sum / f64::from(count),
            subjects_studied: subjects.len() as u32,
        })
        .collect()
}

/// Weekly buckets, weeks starting Monday. The weekly average is weighted by
/// attempt count, not a mean of daily means.
fn bucket_weekly(daily: &[DailyTrend], history: &[AttemptRecord]) -> Vec<WeeklyTrend> {
    let mut weeks: BTreeMap<NaiveDate, (u32, u32, f64)> = BTreeMap::new();

    for day in daily {
        let week_start = day.date.week(Weekday::Mon).first_day();
        let entry = weeks.entry(week_start).or_insert((0, 0, 0.0));
        entry.0 += 1;
    }
    for attempt in history {
        let week_start = attempt
            .timestamp
            .date_naive()
            .week(Weekday::Mon)
            .first_day();
        let entry = weeks.entry(week_start).or_insert((0, 0, 0.0));
        entry.1 += 1;
        entry.2 += attempt.score;
    }

    weeks
        .into_iter()
        .map(|(week_start, (days_active, attempts, score_sum))| WeeklyTrend {
            week_start,
            days_active,
            average_score: if attempts > 0 {
                score_sum / f64::from(attempts)
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::types::Difficulty;

    fn attempt(subject: &str, score: f64, days_ago: i64, now: DateTime<Utc>) -> AttemptRecord {
        AttemptRecord {
            user_id: "u1".to_string(),
            topic_id: "t1".to_string(),
            subject_id: subject.to_string(),
            score,
            time_spent_seconds: 120,
            difficulty: Difficulty::Beginner,
            timestamp: now - Duration::days(days_ago),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        // A Wednesday, midday.
        Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
    }

    fn analyze(history: &[AttemptRecord]) -> TrendSnapshot {
        TrendAnalyzer::default().analyze("u1", history, fixed_now())
    }

    #[test]
    fn zero_attempts_is_new_learner() {
        let snapshot = analyze(&[]);
        assert_eq!(snapshot.overall_trend, OverallTrend::NewLearner);
        assert_eq!(snapshot.total_days_active, 0);
        assert!(snapshot.daily_trends.is_empty());
        assert!(snapshot.weekly_trends.is_empty());
    }

    #[test]
    fn below_sample_threshold_is_new_learner() {
        let now = fixed_now();
        let history: Vec<_> = (0..4).map(|i| attempt("math", 70.0, i, now)).collect();
        let mut sorted = history;
        sorted.sort_by_key(|a| a.timestamp);
        assert_eq!(analyze(&sorted).overall_trend, OverallTrend::NewLearner);
    }

    #[test]
    fn old_history_is_no_recent_activity() {
        let now = fixed_now();
        let history: Vec<_> = (0..6)
            .map(|i| attempt("math", 70.0, 30 + i, now))
            .rev()
            .collect();
        assert_eq!(analyze(&history).overall_trend, OverallTrend::NoRecentActivity);
    }

    #[test]
    fn single_active_week_is_insufficient_data() {
        let now = fixed_now();
        // Five attempts, all inside the current Monday-started week.
        let history: Vec<_> = (0..5).map(|i| attempt("math", 70.0, 2 - (i % 2), now)).collect();
        let mut sorted = history;
        sorted.sort_by_key(|a| a.timestamp);
        assert_eq!(analyze(&sorted).overall_trend, OverallTrend::InsufficientData);
    }

    #[test]
    fn rising_weekly_average_is_improving() {
        let now = fixed_now();
        let mut history = vec![
            attempt("math", 55.0, 9, now),
            attempt("math", 60.0, 8, now),
            attempt("math", 58.0, 8, now),
            attempt("math", 75.0, 2, now),
            attempt("math", 80.0, 1, now),
        ];
        history.sort_by_key(|a| a.timestamp);
        assert_eq!(analyze(&history).overall_trend, OverallTrend::Improving);
    }

    #[test]
    fn falling_weekly_average_is_declining() {
        let now = fixed_now();
        let mut history = vec![
            attempt("math", 85.0, 9, now),
            attempt("math", 80.0, 8, now),
            attempt("science", 82.0, 8, now),
            attempt("math", 60.0, 2, now),
            attempt("math", 55.0, 1, now),
        ];
        history.sort_by_key(|a| a.timestamp);
        assert_eq!(analyze(&history).overall_trend, OverallTrend::Declining);
    }

    #[test]
    fn within_noise_threshold_is_stable() {
        let now = fixed_now();
        let mut history = vec![
            attempt("math", 70.0, 9, now),
            attempt("math", 72.0, 8, now),
            attempt("math", 71.0, 2, now),
            attempt("math", 72.0, 1, now),
            attempt("math", 70.0, 1, now),
        ];
        history.sort_by_key(|a| a.timestamp);
        assert_eq!(analyze(&history).overall_trend, OverallTrend::Stable);
    }

    #[test]
    fn daily_buckets_count_distinct_subjects() {
        let now = fixed_now();
        let mut history = vec![
            attempt("math", 60.0, 1, now),
            attempt("science", 80.0, 1, now),
            attempt("math", 70.0, 1, now),
            attempt("math", 90.0, 0, now),
        ];
        history.sort_by_key(|a| a.timestamp);
        let snapshot = analyze(&history);

        assert_eq!(snapshot.daily_trends.len(), 2);
        let busy_day = &snapshot.daily_trends[0];
        assert_eq!(busy_day.quiz_count, 3);
        assert_eq!(busy_day.subjects_studied, 2);
        assert!((busy_day.average_score - 70.0).abs() < 1e-9);
        assert_eq!(snapshot.total_days_active, 2);
    }

    #[test]
    fn weekly_average_is_attempt_weighted() {
        let now = fixed_now();
        // Same week: one day with two low scores, one day with one high score.
        let mut history = vec![
            attempt("math", 40.0, 2, now),
            attempt("math", 40.0, 2, now),
            attempt("math", 100.0, 1, now),
        ];
        history.sort_by_key(|a| a.timestamp);
        let snapshot = analyze(&history);
        assert_eq!(snapshot.weekly_trends.len(), 1);
        // (40 + 40 + 100) / 3, not (40 + 100) / 2.
        assert!((snapshot.weekly_trends[0].average_score - 60.0).abs() < 1e-9);
        assert_eq!(snapshot.weekly_trends[0].days_active, 2);
    }
}

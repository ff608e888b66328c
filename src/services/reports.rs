use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AlertLevel, ProcessedMatch, ScoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeagueSummary {
    pub league: String,
    pub matches: usize,
    pub mean_score: f64,
    pub max_score: f64,
}

/// Count per alert level, every level listed in order.
pub fn alert_distribution(results: &[ScoreResult]) -> Vec<(AlertLevel, usize)> {
    AlertLevel::ALL
        .iter()
        .map(|level| (*level, results.iter().filter(|r| r.alert_level == *level).count()))
        .collect()
}

/// Highest scores first; ties keep input order.
pub fn top_suspicious(results: &[ScoreResult], n: usize) -> Vec<&ScoreResult> {
    let mut ranked: Vec<&ScoreResult> = results.iter().collect();
    ranked.sort_by(|a, b| b.integrity_score.total_cmp(&a.integrity_score));
    ranked.truncate(n);
    ranked
}

pub fn above_threshold(results: &[ScoreResult], threshold: f64) -> Vec<&ScoreResult> {
    results.iter().filter(|r| r.integrity_score >= threshold).collect()
}

/// Mean and max score per league, sorted by league name. Unlabelled matches group under "unknown".
pub fn league_summary(results: &[ScoreResult]) -> Vec<LeagueSummary> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in results {
        groups
            .entry(r.league.as_deref().unwrap_or("unknown"))
            .or_default()
            .push(r.integrity_score);
    }
    groups
        .into_iter()
        .map(|(league, scores)| LeagueSummary {
            league: league.to_string(),
            matches: scores.len(),
            mean_score: scores.iter().sum::<f64>() / scores.len() as f64,
            max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
        .collect()
}

/// How often each flag was raised.
pub fn flag_counts(matches: &[ProcessedMatch]) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for m in matches {
        for (i, (name, raised)) in m.flags.named().into_iter().enumerate() {
            if counts.len() <= i {
                counts.push((name, 0));
            }
            if raised == Some(true) {
                counts[i].1 += 1;
            }
        }
    }
    counts
}

pub fn multi_flag_matches(matches: &[ProcessedMatch], min_flags: u32) -> Vec<&ProcessedMatch> {
    matches.iter().filter(|m| m.flags.total_flags >= min_flags).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyFlags, FormFeatures, MatchMeasures, MatchRecord};
    use chrono::NaiveDate;

    fn result(score: f64, level: AlertLevel, league: Option<&str>) -> ScoreResult {
        ScoreResult {
            date: None,
            home_team: None,
            away_team: None,
            integrity_score: score,
            alert_level: level,
            iso_score: 0.0,
            rf_score: 0.0,
            lr_score: 0.0,
            home_goals: None,
            away_goals: None,
            result: None,
            league: league.map(str::to_string),
            season: None,
        }
    }

    fn results() -> Vec<ScoreResult> {
        vec![
            result(12.0, AlertLevel::Normal, Some("E0")),
            result(85.0, AlertLevel::HighAlert, Some("E0")),
            result(45.0, AlertLevel::Monitor, Some("SP1")),
            result(20.0, AlertLevel::Normal, None),
        ]
    }

    #[test]
    fn distribution_lists_every_level() {
        let dist = alert_distribution(&results());
        assert_eq!(
            dist,
            vec![
                (AlertLevel::Normal, 2),
                (AlertLevel::Monitor, 1),
                (AlertLevel::Suspicious, 0),
                (AlertLevel::HighAlert, 1)
            ]
        );
    }

    #[test]
    fn ranking_and_threshold() {
        let all = results();
        let top = top_suspicious(&all, 2);
        assert_eq!(top[0].integrity_score, 85.0);
        assert_eq!(top[1].integrity_score, 45.0);
        assert_eq!(above_threshold(&all, 45.0).len(), 2);
    }

    #[test]
    fn leagues_are_summarised() {
        let summary = league_summary(&results());
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].league, "E0");
        assert_eq!(summary[0].matches, 2);
        assert!((summary[0].mean_score - 48.5).abs() < 1e-12);
        assert_eq!(summary[0].max_score, 85.0);
        assert_eq!(summary[2].league, "unknown");
    }

    #[test]
    fn flags_are_counted() {
        let flagged = |odds: bool, streak: bool| {
            let flags = AnomalyFlags {
                odds_movement: Some(odds),
                streak_break: Some(streak),
                total_flags: odds as u32 + streak as u32,
                ..Default::default()
            };
            ProcessedMatch {
                record: MatchRecord::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "A", "B", 0, 1),
                form: FormFeatures::default(),
                measures: MatchMeasures::default(),
                flags,
            }
        };
        let matches = vec![flagged(true, true), flagged(true, false), flagged(false, false)];
        let counts = flag_counts(&matches);
        assert_eq!(counts[0], ("flag_odds_movement", 2));
        assert_eq!(counts[2], ("flag_streak_break", 1));
        assert_eq!(multi_flag_matches(&matches, 2).len(), 1);
    }
}

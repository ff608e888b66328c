use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::{IntegrityError, Result};
use crate::models::{MatchOutcome, MatchRecord, MatchStats, OutcomePrices};
use crate::store::RawMatchRow;
use crate::utils::parse_match_date;

/// Largest goal count accepted for one side.
const MAX_GOALS: u32 = 99;
/// Largest per-side statistic (shots, corners, fouls, cards) accepted.
const MAX_STAT_COUNT: u32 = 999;

/// Counts of what cleaning did to an input table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub kept: usize,
    pub missing_required: usize,
    pub invalid_result: usize,
    pub duplicates: usize,
    /// Goal counts beyond any real football score.
    pub implausible_goals: usize,
    /// Kept records whose result code disagrees with the goals.
    pub inconsistent_results: usize,
}

impl CleaningReport {
    pub fn dropped(&self) -> usize {
        self.missing_required + self.invalid_result + self.duplicates + self.implausible_goals
    }
}

/// Turn raw rows into validated records, preserving input order.
///
/// Rows missing a date, a team or goals, rows with an unknown result code and repeated
/// (date, home, away) keys are dropped. Fails with `EmptyDataset` when nothing survives.
pub fn clean_matches(rows: Vec<RawMatchRow>) -> Result<(Vec<MatchRecord>, CleaningReport)> {
    let mut report = CleaningReport {
        input_rows: rows.len(),
        ..Default::default()
    };
    let mut seen: HashSet<(NaiveDate, String, String)> = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let record = match clean_row(row) {
            Ok(record) => record,
            Err(RowDefect::MissingRequired) => {
                report.missing_required += 1;
                continue;
            }
            Err(RowDefect::InvalidResult) => {
                report.invalid_result += 1;
                continue;
            }
            Err(RowDefect::ImplausibleGoals) => {
                report.implausible_goals += 1;
                continue;
            }
        };

        let key = (record.date, record.home_team.clone(), record.away_team.clone());
        if !seen.insert(key) {
            report.duplicates += 1;
            continue;
        }

        if record.result != MatchOutcome::from_goals(record.home_goals, record.away_goals) {
            report.inconsistent_results += 1;
        }
        records.push(record);
    }

    report.kept = records.len();

    if report.dropped() > 0 {
        tracing::warn!(
            "Dropped {} malformed records ({} missing fields, {} invalid result, {} duplicates, {} implausible goals)",
            report.dropped(),
            report.missing_required,
            report.invalid_result,
            report.duplicates,
            report.implausible_goals
        );
    }
    if report.inconsistent_results > 0 {
        tracing::warn!(
            "{} records have a result code that disagrees with the goals; keeping the declared result",
            report.inconsistent_results
        );
    }
    tracing::info!("{} records after cleaning", report.kept);

    if records.is_empty() {
        return Err(IntegrityError::EmptyDataset);
    }
    Ok((records, report))
}

enum RowDefect {
    MissingRequired,
    InvalidResult,
    ImplausibleGoals,
}

fn clean_row(row: RawMatchRow) -> std::result::Result<MatchRecord, RowDefect> {
    let date = row
        .date
        .as_deref()
        .and_then(parse_match_date)
        .ok_or(RowDefect::MissingRequired)?;
    let home_team = team_name(row.home_team).ok_or(RowDefect::MissingRequired)?;
    let away_team = team_name(row.away_team).ok_or(RowDefect::MissingRequired)?;
    let home_goals = goals(row.home_goals).ok_or(RowDefect::MissingRequired)?;
    let away_goals = goals(row.away_goals).ok_or(RowDefect::MissingRequired)?;
    if home_goals > MAX_GOALS || away_goals > MAX_GOALS {
        return Err(RowDefect::ImplausibleGoals);
    }

    let result = match row.result.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(code) => MatchOutcome::parse_code(code).ok_or(RowDefect::InvalidResult)?,
        None => MatchOutcome::from_goals(home_goals, away_goals),
    };

    let ht_home_goals = goals(row.ht_home_goals).filter(|g| *g <= MAX_GOALS);
    let ht_away_goals = goals(row.ht_away_goals).filter(|g| *g <= MAX_GOALS);
    let ht_result = row
        .ht_result
        .as_deref()
        .and_then(MatchOutcome::parse_code)
        .or_else(|| match (ht_home_goals, ht_away_goals) {
            (Some(h), Some(a)) => Some(MatchOutcome::from_goals(h, a)),
            _ => None,
        });

    Ok(MatchRecord {
        date,
        home_team,
        away_team,
        home_goals,
        away_goals,
        result,
        ht_home_goals,
        ht_away_goals,
        ht_result,
        stats: MatchStats {
            home_shots: count(row.home_shots),
            away_shots: count(row.away_shots),
            home_shots_on_target: count(row.home_shots_on_target),
            away_shots_on_target: count(row.away_shots_on_target),
            home_corners: count(row.home_corners),
            away_corners: count(row.away_corners),
            home_fouls: count(row.home_fouls),
            away_fouls: count(row.away_fouls),
            home_yellow_cards: count(row.home_yellow_cards),
            away_yellow_cards: count(row.away_yellow_cards),
            home_red_cards: count(row.home_red_cards),
            away_red_cards: count(row.away_red_cards),
        },
        opening_odds: OutcomePrices {
            home: price(row.odds_open_home),
            draw: price(row.odds_open_draw),
            away: price(row.odds_open_away),
        },
        closing_odds: OutcomePrices {
            home: price(row.odds_close_home),
            draw: price(row.odds_close_draw),
            away: price(row.odds_close_away),
        },
        league: non_empty(row.league),
        season: non_empty(row.season),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn team_name(value: Option<String>) -> Option<String> {
    non_empty(value)
}

/// Goals must be present and non-negative.
fn goals(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// Statistics are clipped at zero rather than rejected; out-of-range counts are treated as missing.
fn count(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round())
        .filter(|v| *v <= MAX_STAT_COUNT as f64)
        .map(|v| v as u32)
}

fn price(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(date: &str, home: &str, away: &str, hg: Option<f64>, ag: Option<f64>, result: Option<&str>) -> RawMatchRow {
        RawMatchRow {
            date: Some(date.to_string()),
            home_team: Some(home.to_string()),
            away_team: Some(away.to_string()),
            home_goals: hg,
            away_goals: ag,
            result: result.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn drops_malformed_rows_and_counts_them() {
        let rows = vec![
            raw("2024-08-16", "A", "B", Some(1.0), Some(0.0), Some("H")),
            raw("2024-08-16", "A", "B", Some(2.0), Some(0.0), Some("H")), // duplicate key
            raw("2024-08-17", "C", "D", None, Some(0.0), Some("A")),      // missing goals
            raw("2024-08-17", "E", "F", Some(1.0), Some(1.0), Some("X")), // invalid result
            raw("not a date", "G", "H", Some(1.0), Some(1.0), Some("D")),
            raw("2024-08-18", "  ", "H", Some(1.0), Some(1.0), Some("D")),
        ];

        let (records, report) = clean_matches(rows).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].home_goals, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid_result, 1);
        assert_eq!(report.missing_required, 3);
        assert_eq!(report.dropped(), 5);
    }

    #[test]
    fn normalises_names_and_result_codes() {
        let rows = vec![raw("2024-08-16", "  Arsenal ", "Wolves", Some(2.0), Some(0.0), Some(" h "))];
        let (records, _) = clean_matches(rows).unwrap();
        assert_eq!(records[0].home_team, "Arsenal");
        assert_eq!(records[0].result, MatchOutcome::Home);
    }

    #[test]
    fn derives_missing_result_and_keeps_inconsistent_one() {
        let rows = vec![
            raw("2024-08-16", "A", "B", Some(0.0), Some(2.0), None),
            raw("2024-08-17", "C", "D", Some(3.0), Some(0.0), Some("D")),
        ];
        let (records, report) = clean_matches(rows).unwrap();
        assert_eq!(records[0].result, MatchOutcome::Away);
        assert_eq!(records[1].result, MatchOutcome::Draw);
        assert_eq!(report.inconsistent_results, 1);
    }

    #[test]
    fn clips_negative_statistics_and_odds() {
        let mut row = raw("2024-08-16", "A", "B", Some(1.0), Some(0.0), Some("H"));
        row.home_yellow_cards = Some(-2.0);
        row.odds_open_home = Some(-1.5);
        let (records, _) = clean_matches(vec![row]).unwrap();
        assert_eq!(records[0].stats.home_yellow_cards, Some(0));
        assert_eq!(records[0].opening_odds.home, Some(0.0));
    }

    #[test]
    fn implausible_counts_are_rejected() {
        let mut stats = raw("2024-08-18", "E", "F", Some(2.0), Some(2.0), None);
        stats.home_fouls = Some(1e12);
        stats.ht_home_goals = Some(4294967295.0);
        let rows = vec![
            raw("2024-08-16", "A", "B", Some(4294967295.0), Some(1.0), None),
            raw("2024-08-17", "C", "D", Some(3.0), Some(1e20), Some("A")),
            stats,
        ];
        let (records, report) = clean_matches(rows).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.implausible_goals, 2);
        assert_eq!(report.dropped(), 2);
        assert_eq!(records[0].stats.home_fouls, None);
        assert_eq!(records[0].ht_home_goals, None);
    }

    #[test]
    fn empty_after_cleaning_is_an_error() {
        let rows = vec![raw("2024-08-16", "A", "B", None, None, None)];
        assert!(matches!(clean_matches(rows), Err(IntegrityError::EmptyDataset)));
    }
}

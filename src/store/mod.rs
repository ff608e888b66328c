pub mod artifacts;
pub mod raw;

pub use artifacts::{bundle_path, load_bundle, save_bundle};
pub use raw::RawMatchRow;

use chrono::NaiveDate;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::Result;
use crate::models::{MatchOutcome, ProcessedMatch, ScoreResult};

/// Read every parseable row of a match table. Rows the CSV layer cannot decode are skipped
/// and counted; field-level validation happens in cleaning.
pub fn read_raw_matches(path: &Path) -> Result<Vec<RawMatchRow>> {
    let file = std::fs::File::open(path)?;
    let rows = read_raw_matches_from(file)?;
    tracing::info!("Loaded {} match rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_raw_matches_from<R: Read>(reader: R) -> Result<Vec<RawMatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut unreadable = 0usize;
    for row in reader.deserialize::<RawMatchRow>() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => {
                unreadable += 1;
                tracing::debug!("Skipping unreadable row: {}", e);
            }
        }
    }

    if unreadable > 0 {
        tracing::warn!("Skipped {} unreadable rows", unreadable);
    }
    Ok(rows)
}

/// Flat output row of the feature-engineering pass: input columns plus form, measures and flags.
#[derive(Debug, Serialize)]
struct ProcessedRow<'a> {
    date: NaiveDate,
    home_team: &'a str,
    away_team: &'a str,
    home_goals: u32,
    away_goals: u32,
    result: MatchOutcome,
    ht_home_goals: Option<u32>,
    ht_away_goals: Option<u32>,
    ht_result: Option<MatchOutcome>,
    home_shots: Option<u32>,
    away_shots: Option<u32>,
    home_shots_on_target: Option<u32>,
    away_shots_on_target: Option<u32>,
    home_corners: Option<u32>,
    away_corners: Option<u32>,
    home_fouls: Option<u32>,
    away_fouls: Option<u32>,
    home_yellow_cards: Option<u32>,
    away_yellow_cards: Option<u32>,
    home_red_cards: Option<u32>,
    away_red_cards: Option<u32>,
    odds_open_home: Option<f64>,
    odds_open_draw: Option<f64>,
    odds_open_away: Option<f64>,
    odds_close_home: Option<f64>,
    odds_close_draw: Option<f64>,
    odds_close_away: Option<f64>,
    league: Option<&'a str>,
    season: Option<&'a str>,
    home_win_streak: u32,
    away_loss_streak: u32,
    home_form_last5: &'a str,
    away_form_last5: &'a str,
    home_avg_goals_scored: f64,
    home_avg_goals_conceded: f64,
    away_avg_goals_scored: f64,
    away_avg_goals_conceded: f64,
    odds_movement_home: Option<f64>,
    odds_movement_draw: Option<f64>,
    odds_movement_away: Option<f64>,
    odds_movement_abs_max: Option<f64>,
    overround: Option<f64>,
    norm_prob_home: Option<f64>,
    norm_prob_draw: Option<f64>,
    norm_prob_away: Option<f64>,
    expected_result: Option<MatchOutcome>,
    result_surprise: Option<u8>,
    total_goals: u32,
    goal_difference: i32,
    ht_total_goals: Option<u32>,
    ht_result_changed: Option<u8>,
    total_cards: Option<u32>,
    total_shots: Option<u32>,
    total_corners: Option<u32>,
    total_fouls: Option<u32>,
    flag_odds_movement: Option<u8>,
    flag_result_surprise: Option<u8>,
    flag_streak_break: Option<u8>,
    flag_goals_anomaly_home: Option<u8>,
    flag_goals_anomaly_away: Option<u8>,
    flag_ht_result_changed: Option<u8>,
    flag_cards_anomaly: Option<u8>,
    total_flags: u32,
}

fn bit(flag: Option<bool>) -> Option<u8> {
    flag.map(u8::from)
}

impl<'a> From<&'a ProcessedMatch> for ProcessedRow<'a> {
    fn from(m: &'a ProcessedMatch) -> Self {
        let r = &m.record;
        let s = &r.stats;
        Self {
            date: r.date,
            home_team: &r.home_team,
            away_team: &r.away_team,
            home_goals: r.home_goals,
            away_goals: r.away_goals,
            result: r.result,
            ht_home_goals: r.ht_home_goals,
            ht_away_goals: r.ht_away_goals,
            ht_result: r.ht_result,
            home_shots: s.home_shots,
            away_shots: s.away_shots,
            home_shots_on_target: s.home_shots_on_target,
            away_shots_on_target: s.away_shots_on_target,
            home_corners: s.home_corners,
            away_corners: s.away_corners,
            home_fouls: s.home_fouls,
            away_fouls: s.away_fouls,
            home_yellow_cards: s.home_yellow_cards,
            away_yellow_cards: s.away_yellow_cards,
            home_red_cards: s.home_red_cards,
            away_red_cards: s.away_red_cards,
            odds_open_home: r.opening_odds.home,
            odds_open_draw: r.opening_odds.draw,
            odds_open_away: r.opening_odds.away,
            odds_close_home: r.closing_odds.home,
            odds_close_draw: r.closing_odds.draw,
            odds_close_away: r.closing_odds.away,
            league: r.league.as_deref(),
            season: r.season.as_deref(),
            home_win_streak: m.form.home_win_streak,
            away_loss_streak: m.form.away_loss_streak,
            home_form_last5: &m.form.home_form_last5,
            away_form_last5: &m.form.away_form_last5,
            home_avg_goals_scored: m.form.home_avg_goals_scored,
            home_avg_goals_conceded: m.form.home_avg_goals_conceded,
            away_avg_goals_scored: m.form.away_avg_goals_scored,
            away_avg_goals_conceded: m.form.away_avg_goals_conceded,
            odds_movement_home: m.measures.odds_movement_home,
            odds_movement_draw: m.measures.odds_movement_draw,
            odds_movement_away: m.measures.odds_movement_away,
            odds_movement_abs_max: m.measures.odds_movement_abs_max,
            overround: m.measures.overround,
            norm_prob_home: m.measures.norm_prob_home,
            norm_prob_draw: m.measures.norm_prob_draw,
            norm_prob_away: m.measures.norm_prob_away,
            expected_result: m.measures.expected_result,
            result_surprise: bit(m.measures.result_surprise),
            total_goals: m.measures.total_goals,
            goal_difference: m.measures.goal_difference,
            ht_total_goals: m.measures.ht_total_goals,
            ht_result_changed: bit(m.measures.ht_result_changed),
            total_cards: m.measures.total_cards,
            total_shots: m.measures.total_shots,
            total_corners: m.measures.total_corners,
            total_fouls: m.measures.total_fouls,
            flag_odds_movement: bit(m.flags.odds_movement),
            flag_result_surprise: bit(m.flags.result_surprise),
            flag_streak_break: bit(m.flags.streak_break),
            flag_goals_anomaly_home: bit(m.flags.goals_anomaly_home),
            flag_goals_anomaly_away: bit(m.flags.goals_anomaly_away),
            flag_ht_result_changed: bit(m.flags.ht_result_changed),
            flag_cards_anomaly: bit(m.flags.cards_anomaly),
            total_flags: m.flags.total_flags,
        }
    }
}

pub fn write_processed(path: &Path, matches: &[ProcessedMatch]) -> Result<()> {
    ensure_parent(path)?;
    let file = std::fs::File::create(path)?;
    write_processed_to(file, matches)?;
    tracing::info!("Wrote {} processed matches to {}", matches.len(), path.display());
    Ok(())
}

pub fn write_processed_to<W: Write>(writer: W, matches: &[ProcessedMatch]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for m in matches {
        writer.serialize(ProcessedRow::from(m))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_scores(path: &Path, scores: &[ScoreResult]) -> Result<()> {
    ensure_parent(path)?;
    let file = std::fs::File::create(path)?;
    write_scores_to(file, scores)?;
    tracing::info!("Wrote {} scores to {}", scores.len(), path.display());
    Ok(())
}

pub fn write_scores_to<W: Write>(writer: W, scores: &[ScoreResult]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for score in scores {
        writer.serialize(score)?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

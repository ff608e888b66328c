use chrono::NaiveDate;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::models::FormResult;

/// Date formats seen in exported match tables (ISO first, then the dd/mm variants).
///
/// `%y` must come before `%Y`: `%Y` also accepts a two-digit year ("24" as year 24), while `%y`
/// rejects a four-digit one.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a match date, ignoring any time-of-day suffix.
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(trimmed);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Convert an ordered run of results to a form string (e.g., "WLWDW"), oldest first.
pub fn results_to_form<'a>(results: impl IntoIterator<Item = &'a FormResult>) -> String {
    results.into_iter().map(|r| r.letter()).collect()
}

/// Calculate win percentage from wins, draws, and losses
pub fn calculate_win_percentage(wins: u32, draws: u32, losses: u32) -> f64 {
    let total_games = wins + losses + draws;
    if total_games == 0 {
        return 0.0;
    }

    let points = wins * 3 + draws; // Football scoring
    (points as f64) / ((total_games * 3) as f64) * 100.0
}

/// Convert decimal odds to raw implied probability (includes the bookmaker margin).
pub fn odds_to_probability(odds: f64) -> Option<f64> {
    if odds <= 0.0 || !odds.is_finite() {
        return None;
    }
    Some(1.0 / odds)
}

/// Normalize probabilities to sum to 1.0
pub fn normalize_probabilities(probs: Vec<f64>) -> Vec<f64> {
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 {
        return probs;
    }
    probs.iter().map(|p| p / sum).collect()
}

/// De-vigged 1X2 probabilities and the overround of a price triple.
pub fn devig_prices(home: f64, draw: f64, away: f64) -> Option<([f64; 3], f64)> {
    let implied = [
        odds_to_probability(home)?,
        odds_to_probability(draw)?,
        odds_to_probability(away)?,
    ];
    let overround = implied.iter().sum::<f64>() - 1.0;
    let normalized = normalize_probabilities(implied.to_vec());
    Some(([normalized[0], normalized[1], normalized[2]], overround))
}

/// Fractional price change from opening to closing.
pub fn fractional_movement(open: f64, close: f64) -> Option<f64> {
    if open == 0.0 || !open.is_finite() || !close.is_finite() {
        return None;
    }
    Some((close - open) / open)
}

/// Mean and sample standard deviation; `None` for fewer than two values.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().mean();
    let std = values.iter().std_dev();
    if mean.is_finite() && std.is_finite() {
        Some((mean, std))
    } else {
        None
    }
}

/// Sample quantile of `values` (tau in [0, 1]); `None` when empty.
pub fn quantile(values: &[f64], tau: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut data = Data::new(values.to_vec());
    let q = data.quantile(tau);
    q.is_finite().then_some(q)
}

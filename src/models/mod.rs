use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Full-time (or half-time) result code from the home side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    #[serde(rename = "H")]
    Home,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "A")]
    Away,
}

impl MatchOutcome {
    pub fn from_goals(home_goals: u32, away_goals: u32) -> Self {
        match home_goals.cmp(&away_goals) {
            std::cmp::Ordering::Greater => MatchOutcome::Home,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
            std::cmp::Ordering::Less => MatchOutcome::Away,
        }
    }

    /// Parses `H`/`D`/`A`, ignoring surrounding whitespace and case.
    pub fn parse_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "H" => Some(MatchOutcome::Home),
            "D" => Some(MatchOutcome::Draw),
            "A" => Some(MatchOutcome::Away),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            MatchOutcome::Home => 'H',
            MatchOutcome::Draw => 'D',
            MatchOutcome::Away => 'A',
        }
    }

    /// Result letter for the home side (`W`/`D`/`L`).
    pub fn for_home(self) -> FormResult {
        match self {
            MatchOutcome::Home => FormResult::Win,
            MatchOutcome::Draw => FormResult::Draw,
            MatchOutcome::Away => FormResult::Loss,
        }
    }

    pub fn for_away(self) -> FormResult {
        match self {
            MatchOutcome::Home => FormResult::Loss,
            MatchOutcome::Draw => FormResult::Draw,
            MatchOutcome::Away => FormResult::Win,
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One team's result in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormResult {
    Win,
    Draw,
    Loss,
}

impl FormResult {
    pub fn letter(self) -> char {
        match self {
            FormResult::Win => 'W',
            FormResult::Draw => 'D',
            FormResult::Loss => 'L',
        }
    }
}

/// Decimal prices for the three 1X2 outcomes; any of them may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrices {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
}

impl OutcomePrices {
    pub fn complete(&self) -> Option<(f64, f64, f64)> {
        match (self.home, self.draw, self.away) {
            (Some(h), Some(d), Some(a)) => Some((h, d, a)),
            _ => None,
        }
    }
}

/// Per-side match statistics; every field is optional in the source data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub home_shots: Option<u32>,
    pub away_shots: Option<u32>,
    pub home_shots_on_target: Option<u32>,
    pub away_shots_on_target: Option<u32>,
    pub home_corners: Option<u32>,
    pub away_corners: Option<u32>,
    pub home_fouls: Option<u32>,
    pub away_fouls: Option<u32>,
    pub home_yellow_cards: Option<u32>,
    pub away_yellow_cards: Option<u32>,
    pub home_red_cards: Option<u32>,
    pub away_red_cards: Option<u32>,
}

/// A cleaned fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32,
    pub away_goals: u32,
    pub result: MatchOutcome,
    #[serde(default)]
    pub ht_home_goals: Option<u32>,
    #[serde(default)]
    pub ht_away_goals: Option<u32>,
    #[serde(default)]
    pub ht_result: Option<MatchOutcome>,
    #[serde(default)]
    pub stats: MatchStats,
    #[serde(default)]
    pub opening_odds: OutcomePrices,
    #[serde(default)]
    pub closing_odds: OutcomePrices,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
}

impl MatchRecord {
    /// Minimal record with goals and a result consistent with them.
    #[cfg(test)]
    pub fn new(date: NaiveDate, home_team: &str, away_team: &str, home_goals: u32, away_goals: u32) -> Self {
        Self {
            date,
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            home_goals,
            away_goals,
            result: MatchOutcome::from_goals(home_goals, away_goals),
            ht_home_goals: None,
            ht_away_goals: None,
            ht_result: None,
            stats: MatchStats::default(),
            opening_odds: OutcomePrices::default(),
            closing_odds: OutcomePrices::default(),
            league: None,
            season: None,
        }
    }
}

/// Rolling form of both participants as of immediately before the match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormFeatures {
    pub home_win_streak: u32,
    pub away_loss_streak: u32,
    pub home_form_last5: String,
    pub away_form_last5: String,
    pub home_avg_goals_scored: f64,
    pub home_avg_goals_conceded: f64,
    pub away_avg_goals_scored: f64,
    pub away_avg_goals_conceded: f64,
}

/// Per-match measures derived from odds, goals and statistics before flagging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMeasures {
    pub odds_movement_home: Option<f64>,
    pub odds_movement_draw: Option<f64>,
    pub odds_movement_away: Option<f64>,
    pub odds_movement_abs_max: Option<f64>,
    pub overround: Option<f64>,
    pub norm_prob_home: Option<f64>,
    pub norm_prob_draw: Option<f64>,
    pub norm_prob_away: Option<f64>,
    pub expected_result: Option<MatchOutcome>,
    pub result_surprise: Option<bool>,
    pub total_goals: u32,
    pub goal_difference: i32,
    pub ht_total_goals: Option<u32>,
    pub ht_result_changed: Option<bool>,
    pub total_cards: Option<u32>,
    pub total_shots: Option<u32>,
    pub total_corners: Option<u32>,
    pub total_fouls: Option<u32>,
}

/// Binary anomaly flags. `None` means the prerequisites were absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlags {
    pub odds_movement: Option<bool>,
    pub result_surprise: Option<bool>,
    pub streak_break: Option<bool>,
    pub goals_anomaly_home: Option<bool>,
    pub goals_anomaly_away: Option<bool>,
    pub ht_result_changed: Option<bool>,
    pub cards_anomaly: Option<bool>,
    pub total_flags: u32,
}

impl AnomalyFlags {
    pub fn named(&self) -> [(&'static str, Option<bool>); 7] {
        [
            ("flag_odds_movement", self.odds_movement),
            ("flag_result_surprise", self.result_surprise),
            ("flag_streak_break", self.streak_break),
            ("flag_goals_anomaly_home", self.goals_anomaly_home),
            ("flag_goals_anomaly_away", self.goals_anomaly_away),
            ("flag_ht_result_changed", self.ht_result_changed),
            ("flag_cards_anomaly", self.cards_anomaly),
        ]
    }

    pub fn count_raised(&self) -> u32 {
        self.named().iter().filter(|(_, f)| *f == Some(true)).count() as u32
    }
}

/// A record after feature engineering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMatch {
    pub record: MatchRecord,
    pub form: FormFeatures,
    pub measures: MatchMeasures,
    pub flags: AnomalyFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Normal,
    Monitor,
    Suspicious,
    HighAlert,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Normal,
        AlertLevel::Monitor,
        AlertLevel::Suspicious,
        AlertLevel::HighAlert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Monitor => "monitor",
            AlertLevel::Suspicious => "suspicious",
            AlertLevel::HighAlert => "high_alert",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            AlertLevel::Normal => "🟢",
            AlertLevel::Monitor => "🟡",
            AlertLevel::Suspicious => "🟠",
            AlertLevel::HighAlert => "🔴",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constituent sub-model outputs, each normalised to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub outlier: f64,
    pub classifier1: f64,
    pub classifier2: f64,
}

/// Final per-match output. One per (date, home_team, away_team).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub date: Option<NaiveDate>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub integrity_score: f64,
    pub alert_level: AlertLevel,
    pub iso_score: f64,
    pub rf_score: f64,
    pub lr_score: f64,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub result: Option<MatchOutcome>,
    pub league: Option<String>,
    pub season: Option<String>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

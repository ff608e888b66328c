use serde::Deserialize;

/// One row of an input match table, as exported by the ingestion layer.
///
/// Accepts both the normalised snake_case headers and the football-data.co.uk
/// column codes. Every field is optional here; cleaning decides what is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMatchRow {
    #[serde(default, alias = "Date")]
    pub date: Option<String>,
    #[serde(default, alias = "HomeTeam", alias = "Home")]
    pub home_team: Option<String>,
    #[serde(default, alias = "AwayTeam", alias = "Away")]
    pub away_team: Option<String>,
    #[serde(default, alias = "FTHG", alias = "HG", deserialize_with = "csv::invalid_option")]
    pub home_goals: Option<f64>,
    #[serde(default, alias = "FTAG", alias = "AG", deserialize_with = "csv::invalid_option")]
    pub away_goals: Option<f64>,
    #[serde(default, alias = "FTR", alias = "Res")]
    pub result: Option<String>,

    #[serde(default, alias = "HTHG", deserialize_with = "csv::invalid_option")]
    pub ht_home_goals: Option<f64>,
    #[serde(default, alias = "HTAG", deserialize_with = "csv::invalid_option")]
    pub ht_away_goals: Option<f64>,
    #[serde(default, alias = "HTR")]
    pub ht_result: Option<String>,

    #[serde(default, alias = "HS", deserialize_with = "csv::invalid_option")]
    pub home_shots: Option<f64>,
    #[serde(default, alias = "AS", deserialize_with = "csv::invalid_option")]
    pub away_shots: Option<f64>,
    #[serde(default, alias = "HST", deserialize_with = "csv::invalid_option")]
    pub home_shots_on_target: Option<f64>,
    #[serde(default, alias = "AST", deserialize_with = "csv::invalid_option")]
    pub away_shots_on_target: Option<f64>,
    #[serde(default, alias = "HC", deserialize_with = "csv::invalid_option")]
    pub home_corners: Option<f64>,
    #[serde(default, alias = "AC", deserialize_with = "csv::invalid_option")]
    pub away_corners: Option<f64>,
    #[serde(default, alias = "HF", deserialize_with = "csv::invalid_option")]
    pub home_fouls: Option<f64>,
    #[serde(default, alias = "AF", deserialize_with = "csv::invalid_option")]
    pub away_fouls: Option<f64>,
    #[serde(default, alias = "HY", deserialize_with = "csv::invalid_option")]
    pub home_yellow_cards: Option<f64>,
    #[serde(default, alias = "AY", deserialize_with = "csv::invalid_option")]
    pub away_yellow_cards: Option<f64>,
    #[serde(default, alias = "HR", deserialize_with = "csv::invalid_option")]
    pub home_red_cards: Option<f64>,
    #[serde(default, alias = "AR", deserialize_with = "csv::invalid_option")]
    pub away_red_cards: Option<f64>,

    // Opening and closing 1X2 prices (Pinnacle columns in football-data.co.uk exports).
    #[serde(default, alias = "ps_home", alias = "PSH", deserialize_with = "csv::invalid_option")]
    pub odds_open_home: Option<f64>,
    #[serde(default, alias = "ps_draw", alias = "PSD", deserialize_with = "csv::invalid_option")]
    pub odds_open_draw: Option<f64>,
    #[serde(default, alias = "ps_away", alias = "PSA", deserialize_with = "csv::invalid_option")]
    pub odds_open_away: Option<f64>,
    #[serde(default, alias = "ps_close_home", alias = "PSCH", deserialize_with = "csv::invalid_option")]
    pub odds_close_home: Option<f64>,
    #[serde(default, alias = "ps_close_draw", alias = "PSCD", deserialize_with = "csv::invalid_option")]
    pub odds_close_draw: Option<f64>,
    #[serde(default, alias = "ps_close_away", alias = "PSCA", deserialize_with = "csv::invalid_option")]
    pub odds_close_away: Option<f64>,

    #[serde(default, alias = "league_name", alias = "division", alias = "Div")]
    pub league: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
}

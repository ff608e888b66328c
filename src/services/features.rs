use nalgebra::DMatrix;
use std::collections::HashMap;

use crate::error::{IntegrityError, Result};
use crate::models::ProcessedMatch;

/// Every numeric column the feature-engineering pass can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    OddsMovementHome,
    OddsMovementDraw,
    OddsMovementAway,
    OddsMovementAbsMax,
    Overround,
    NormProbHome,
    NormProbDraw,
    NormProbAway,
    ResultSurprise,
    TotalGoals,
    GoalDifference,
    HtTotalGoals,
    HtResultChanged,
    TotalCards,
    TotalShots,
    TotalCorners,
    TotalFouls,
    HomeWinStreak,
    AwayLossStreak,
    HomeAvgGoalsScored,
    HomeAvgGoalsConceded,
    AwayAvgGoalsScored,
    AwayAvgGoalsConceded,
    FlagOddsMovement,
    FlagResultSurprise,
    FlagStreakBreak,
    FlagGoalsAnomalyHome,
    FlagGoalsAnomalyAway,
    FlagHtResultChanged,
    FlagCardsAnomaly,
    TotalFlags,
}

impl Feature {
    pub const ALL: [Feature; 31] = [
        Feature::OddsMovementHome,
        Feature::OddsMovementDraw,
        Feature::OddsMovementAway,
        Feature::OddsMovementAbsMax,
        Feature::Overround,
        Feature::NormProbHome,
        Feature::NormProbDraw,
        Feature::NormProbAway,
        Feature::ResultSurprise,
        Feature::TotalGoals,
        Feature::GoalDifference,
        Feature::HtTotalGoals,
        Feature::HtResultChanged,
        Feature::TotalCards,
        Feature::TotalShots,
        Feature::TotalCorners,
        Feature::TotalFouls,
        Feature::HomeWinStreak,
        Feature::AwayLossStreak,
        Feature::HomeAvgGoalsScored,
        Feature::HomeAvgGoalsConceded,
        Feature::AwayAvgGoalsScored,
        Feature::AwayAvgGoalsConceded,
        Feature::FlagOddsMovement,
        Feature::FlagResultSurprise,
        Feature::FlagStreakBreak,
        Feature::FlagGoalsAnomalyHome,
        Feature::FlagGoalsAnomalyAway,
        Feature::FlagHtResultChanged,
        Feature::FlagCardsAnomaly,
        Feature::TotalFlags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::OddsMovementHome => "odds_movement_home",
            Feature::OddsMovementDraw => "odds_movement_draw",
            Feature::OddsMovementAway => "odds_movement_away",
            Feature::OddsMovementAbsMax => "odds_movement_abs_max",
            Feature::Overround => "overround",
            Feature::NormProbHome => "norm_prob_home",
            Feature::NormProbDraw => "norm_prob_draw",
            Feature::NormProbAway => "norm_prob_away",
            Feature::ResultSurprise => "result_surprise",
            Feature::TotalGoals => "total_goals",
            Feature::GoalDifference => "goal_difference",
            Feature::HtTotalGoals => "ht_total_goals",
            Feature::HtResultChanged => "ht_result_changed",
            Feature::TotalCards => "total_cards",
            Feature::TotalShots => "total_shots",
            Feature::TotalCorners => "total_corners",
            Feature::TotalFouls => "total_fouls",
            Feature::HomeWinStreak => "home_win_streak",
            Feature::AwayLossStreak => "away_loss_streak",
            Feature::HomeAvgGoalsScored => "home_avg_goals_scored",
            Feature::HomeAvgGoalsConceded => "home_avg_goals_conceded",
            Feature::AwayAvgGoalsScored => "away_avg_goals_scored",
            Feature::AwayAvgGoalsConceded => "away_avg_goals_conceded",
            Feature::FlagOddsMovement => "flag_odds_movement",
            Feature::FlagResultSurprise => "flag_result_surprise",
            Feature::FlagStreakBreak => "flag_streak_break",
            Feature::FlagGoalsAnomalyHome => "flag_goals_anomaly_home",
            Feature::FlagGoalsAnomalyAway => "flag_goals_anomaly_away",
            Feature::FlagHtResultChanged => "flag_ht_result_changed",
            Feature::FlagCardsAnomaly => "flag_cards_anomaly",
            Feature::TotalFlags => "total_flags",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Engineered 0/1 indicators that default to 0 when they cannot be computed.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Feature::ResultSurprise
                | Feature::HtResultChanged
                | Feature::FlagOddsMovement
                | Feature::FlagResultSurprise
                | Feature::FlagStreakBreak
                | Feature::FlagGoalsAnomalyHome
                | Feature::FlagGoalsAnomalyAway
                | Feature::FlagHtResultChanged
                | Feature::FlagCardsAnomaly
                | Feature::TotalFlags
        )
    }

    pub fn value(self, m: &ProcessedMatch) -> Option<f64> {
        let bit = |b: Option<bool>| b.map(|v| if v { 1.0 } else { 0.0 });
        let count = |c: Option<u32>| c.map(f64::from);
        let ms = &m.measures;
        let form = &m.form;
        let flags = &m.flags;

        match self {
            Feature::OddsMovementHome => ms.odds_movement_home,
            Feature::OddsMovementDraw => ms.odds_movement_draw,
            Feature::OddsMovementAway => ms.odds_movement_away,
            Feature::OddsMovementAbsMax => ms.odds_movement_abs_max,
            Feature::Overround => ms.overround,
            Feature::NormProbHome => ms.norm_prob_home,
            Feature::NormProbDraw => ms.norm_prob_draw,
            Feature::NormProbAway => ms.norm_prob_away,
            Feature::ResultSurprise => bit(ms.result_surprise),
            Feature::TotalGoals => Some(f64::from(ms.total_goals)),
            Feature::GoalDifference => Some(f64::from(ms.goal_difference)),
            Feature::HtTotalGoals => count(ms.ht_total_goals),
            Feature::HtResultChanged => bit(ms.ht_result_changed),
            Feature::TotalCards => count(ms.total_cards),
            Feature::TotalShots => count(ms.total_shots),
            Feature::TotalCorners => count(ms.total_corners),
            Feature::TotalFouls => count(ms.total_fouls),
            Feature::HomeWinStreak => Some(f64::from(form.home_win_streak)),
            Feature::AwayLossStreak => Some(f64::from(form.away_loss_streak)),
            Feature::HomeAvgGoalsScored => Some(form.home_avg_goals_scored),
            Feature::HomeAvgGoalsConceded => Some(form.home_avg_goals_conceded),
            Feature::AwayAvgGoalsScored => Some(form.away_avg_goals_scored),
            Feature::AwayAvgGoalsConceded => Some(form.away_avg_goals_conceded),
            Feature::FlagOddsMovement => bit(flags.odds_movement),
            Feature::FlagResultSurprise => bit(flags.result_surprise),
            Feature::FlagStreakBreak => bit(flags.streak_break),
            Feature::FlagGoalsAnomalyHome => bit(flags.goals_anomaly_home),
            Feature::FlagGoalsAnomalyAway => bit(flags.goals_anomaly_away),
            Feature::FlagHtResultChanged => bit(flags.ht_result_changed),
            Feature::FlagCardsAnomaly => bit(flags.cards_anomaly),
            Feature::TotalFlags => Some(f64::from(flags.total_flags)),
        }
    }
}

/// Ordered feature slots, fixed when a model is fitted and validated whenever it scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// Parse an exact, ordered list of names. Unknown names are `MissingFeature`.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let features = names
            .iter()
            .map(|n| Feature::from_name(n).ok_or_else(|| IntegrityError::MissingFeature(n.clone())))
            .collect::<Result<Vec<_>>>()?;
        if features.is_empty() {
            return Err(IntegrityError::Configuration("empty feature schema".to_string()));
        }
        Ok(Self { features })
    }

    /// Fit-time resolution: keep the requested features that the training data provides.
    pub fn resolve(requested: &[String], rows: &[ProcessedMatch]) -> Result<Self> {
        let candidates = Self::from_names(requested)?;
        let mut features = Vec::with_capacity(candidates.len());
        for feature in candidates.features {
            if features.contains(&feature) {
                continue;
            }
            if available(feature, rows) {
                features.push(feature);
            } else {
                tracing::warn!("Feature '{}' is not available in the training data; skipping", feature.name());
            }
        }

        if features.is_empty() {
            return Err(IntegrityError::Configuration(format!(
                "none of the requested features are available: {}",
                requested.join(", ")
            )));
        }
        Ok(Self { features })
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Fails with `FeatureMismatch` when a required feature is provided by none of `rows`.
    pub fn check_coverage(&self, rows: &[ProcessedMatch]) -> Result<()> {
        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !f.is_optional() && !available(**f, rows))
            .map(|f| f.name().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IntegrityError::FeatureMismatch { missing })
        }
    }

    /// Dense vector in schema order; absent values inside a covered column become 0.
    pub fn vectorize(&self, m: &ProcessedMatch) -> Vec<f64> {
        self.features.iter().map(|f| f.value(m).unwrap_or(0.0)).collect()
    }

    pub fn matrix(&self, rows: &[ProcessedMatch]) -> DMatrix<f64> {
        let width = self.features.len();
        DMatrix::from_fn(rows.len(), width, |i, j| {
            self.features[j].value(&rows[i]).unwrap_or(0.0)
        })
    }

    /// Vector from caller-supplied named values (online scoring without a match record).
    pub fn vector_from_values(&self, values: &HashMap<String, f64>) -> Result<Vec<f64>> {
        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !f.is_optional() && !values.contains_key(f.name()))
            .map(|f| f.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IntegrityError::FeatureMismatch { missing });
        }
        Ok(self
            .features
            .iter()
            .map(|f| values.get(f.name()).copied().unwrap_or(0.0))
            .collect())
    }
}

fn available(feature: Feature, rows: &[ProcessedMatch]) -> bool {
    rows.iter().any(|m| feature.value(m).is_some())
}

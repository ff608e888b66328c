use crate::config::FlagThresholds;
use crate::models::{AnomalyFlags, FormFeatures, MatchMeasures, MatchOutcome, MatchRecord};
use crate::utils::{devig_prices, fractional_movement, mean_and_std};

/// Odds, goal and statistic measures of a single match. Pure per-record computation.
pub fn derive_measures(record: &MatchRecord) -> MatchMeasures {
    let open = &record.opening_odds;
    let close = &record.closing_odds;
    let movement = |o: Option<f64>, c: Option<f64>| fractional_movement(o?, c?);

    let odds_movement_home = movement(open.home, close.home);
    let odds_movement_draw = movement(open.draw, close.draw);
    let odds_movement_away = movement(open.away, close.away);
    let odds_movement_abs_max = [odds_movement_home, odds_movement_draw, odds_movement_away]
        .into_iter()
        .flatten()
        .map(f64::abs)
        .reduce(f64::max);

    let devigged = close.complete().and_then(|(h, d, a)| devig_prices(h, d, a));
    let expected_result = devigged.map(|(probs, _)| favourite(probs));

    let stats = &record.stats;
    let sum = |a: Option<u32>, b: Option<u32>| Some(a?.saturating_add(b?));
    let total_cards = match sum(stats.home_yellow_cards, stats.away_yellow_cards) {
        Some(yellow) => Some(yellow.saturating_add(sum(stats.home_red_cards, stats.away_red_cards).unwrap_or(0))),
        None => None,
    };

    MatchMeasures {
        odds_movement_home,
        odds_movement_draw,
        odds_movement_away,
        odds_movement_abs_max,
        overround: devigged.map(|(_, overround)| overround),
        norm_prob_home: devigged.map(|(p, _)| p[0]),
        norm_prob_draw: devigged.map(|(p, _)| p[1]),
        norm_prob_away: devigged.map(|(p, _)| p[2]),
        expected_result,
        result_surprise: expected_result.map(|expected| expected != record.result),
        total_goals: record.home_goals.saturating_add(record.away_goals),
        goal_difference: (i64::from(record.home_goals) - i64::from(record.away_goals))
            .clamp(i32::MIN.into(), i32::MAX.into()) as i32,
        ht_total_goals: sum(record.ht_home_goals, record.ht_away_goals),
        ht_result_changed: record.ht_result.map(|ht| ht != record.result),
        total_cards,
        total_shots: sum(stats.home_shots, stats.away_shots),
        total_corners: sum(stats.home_corners, stats.away_corners),
        total_fouls: sum(stats.home_fouls, stats.away_fouls),
    }
}

/// Highest de-vigged probability wins; ties resolve in H, D, A order.
fn favourite(probs: [f64; 3]) -> MatchOutcome {
    let outcomes = [MatchOutcome::Home, MatchOutcome::Draw, MatchOutcome::Away];
    let mut best = 0;
    for i in 1..3 {
        if probs[i] > probs[best] {
            best = i;
        }
    }
    outcomes[best]
}

/// Dataset-wide card statistics.
///
/// This is a batch statistic over the whole processed table, not a causal one: the cards
/// flag describes how unusual a match is within its dataset and never feeds rolling form.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CardStats {
    pub mean: f64,
    pub std: f64,
}

impl CardStats {
    /// `None` when fewer than two matches carry cards or they show no spread.
    pub fn from_measures<'a>(measures: impl IntoIterator<Item = &'a MatchMeasures>) -> Option<Self> {
        let cards: Vec<f64> = measures
            .into_iter()
            .filter_map(|m| m.total_cards)
            .map(f64::from)
            .collect();
        let (mean, std) = mean_and_std(&cards)?;
        (std > 0.0).then_some(Self { mean, std })
    }

    pub fn z_score(&self, cards: u32) -> f64 {
        (cards as f64 - self.mean) / self.std
    }
}

pub struct AnomalyFlagDeriver {
    thresholds: FlagThresholds,
}

impl AnomalyFlagDeriver {
    pub fn new(thresholds: FlagThresholds) -> Self {
        Self { thresholds }
    }

    /// Flags for one match. A flag whose inputs are missing stays `None` and is not counted.
    pub fn flag(
        &self,
        record: &MatchRecord,
        form: &FormFeatures,
        measures: &MatchMeasures,
        cards: Option<&CardStats>,
    ) -> AnomalyFlags {
        let t = &self.thresholds;

        let mut flags = AnomalyFlags {
            odds_movement: measures
                .odds_movement_abs_max
                .map(|m| m.abs() > t.odds_movement_threshold),
            result_surprise: measures.result_surprise,
            streak_break: Some(
                form.home_win_streak >= t.min_win_streak && record.result == MatchOutcome::Away,
            ),
            goals_anomaly_home: Some(
                record.home_goals as f64 > form.home_avg_goals_scored * t.goals_anomaly_multiplier,
            ),
            goals_anomaly_away: Some(
                record.away_goals as f64 > form.away_avg_goals_scored * t.goals_anomaly_multiplier,
            ),
            ht_result_changed: measures.ht_result_changed,
            cards_anomaly: match (cards, measures.total_cards) {
                (Some(stats), Some(total)) => Some(stats.z_score(total) > t.cards_z_threshold),
                _ => None,
            },
            total_flags: 0,
        };
        flags.total_flags = flags.count_raised();
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutcomePrices;
    use chrono::NaiveDate;

    fn record(home_goals: u32, away_goals: u32) -> MatchRecord {
        MatchRecord::new(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), "A", "B", home_goals, away_goals)
    }

    fn prices(home: f64, draw: f64, away: f64) -> OutcomePrices {
        OutcomePrices {
            home: Some(home),
            draw: Some(draw),
            away: Some(away),
        }
    }

    fn deriver() -> AnomalyFlagDeriver {
        AnomalyFlagDeriver::new(FlagThresholds::default())
    }

    #[test]
    fn odds_movement_uses_largest_absolute_change() {
        let mut r = record(1, 0);
        r.opening_odds = prices(1.80, 3.50, 4.50);
        r.closing_odds = prices(2.20, 3.40, 3.60);
        let m = derive_measures(&r);
        assert!((m.odds_movement_home.unwrap() - 0.2222).abs() < 1e-3);
        assert!((m.odds_movement_away.unwrap() + 0.2).abs() < 1e-9);
        assert!((m.odds_movement_abs_max.unwrap() - 0.2222).abs() < 1e-3);

        let flags = deriver().flag(&r, &FormFeatures::default(), &m, None);
        assert_eq!(flags.odds_movement, Some(true));
    }

    #[test]
    fn small_odds_movement_is_not_flagged() {
        let mut r = record(1, 0);
        r.opening_odds = prices(2.00, 3.40, 3.80);
        r.closing_odds = prices(2.10, 3.30, 3.70);
        let m = derive_measures(&r);
        let flags = deriver().flag(&r, &FormFeatures::default(), &m, None);
        assert_eq!(flags.odds_movement, Some(false));
    }

    #[test]
    fn result_surprise_against_devigged_favourite() {
        let mut r = record(0, 2);
        r.closing_odds = prices(1.50, 4.20, 6.50);
        let m = derive_measures(&r);
        assert_eq!(m.expected_result, Some(MatchOutcome::Home));
        assert_eq!(m.result_surprise, Some(true));
        assert!(m.overround.unwrap() > 0.0);

        let mut favourite_won = record(2, 0);
        favourite_won.closing_odds = r.closing_odds;
        assert_eq!(derive_measures(&favourite_won).result_surprise, Some(false));
    }

    #[test]
    fn missing_prerequisites_omit_flags() {
        let r = record(1, 1);
        let m = derive_measures(&r);
        let form = FormFeatures {
            home_avg_goals_scored: 1.5,
            away_avg_goals_scored: 1.1,
            ..Default::default()
        };
        let flags = deriver().flag(&r, &form, &m, None);
        assert_eq!(flags.odds_movement, None);
        assert_eq!(flags.result_surprise, None);
        assert_eq!(flags.ht_result_changed, None);
        assert_eq!(flags.cards_anomaly, None);
        assert_eq!(flags.streak_break, Some(false));
        assert_eq!(flags.total_flags, 0);
    }

    #[test]
    fn first_appearance_flags_any_goal() {
        let first = FormFeatures::default();

        let goalless = record(0, 0);
        let flags = deriver().flag(&goalless, &first, &derive_measures(&goalless), None);
        assert_eq!(flags.goals_anomaly_home, Some(false));
        assert_eq!(flags.goals_anomaly_away, Some(false));
        assert_eq!(flags.total_flags, 0);

        let draw = record(1, 1);
        let flags = deriver().flag(&draw, &first, &derive_measures(&draw), None);
        assert_eq!(flags.goals_anomaly_home, Some(true));
        assert_eq!(flags.goals_anomaly_away, Some(true));
        assert_eq!(flags.total_flags, 2);
    }

    #[test]
    fn streak_break_needs_five_prior_wins_and_an_away_win() {
        let r = record(0, 1);
        let m = derive_measures(&r);

        let five = FormFeatures {
            home_win_streak: 5,
            home_avg_goals_scored: 2.0,
            away_avg_goals_scored: 1.0,
            ..Default::default()
        };
        assert_eq!(deriver().flag(&r, &five, &m, None).streak_break, Some(true));

        let four = FormFeatures {
            home_win_streak: 4,
            ..five.clone()
        };
        assert_eq!(deriver().flag(&r, &four, &m, None).streak_break, Some(false));

        let draw = record(1, 1);
        let flags = deriver().flag(&draw, &five, &derive_measures(&draw), None);
        assert_eq!(flags.streak_break, Some(false));
    }

    #[test]
    fn goals_anomaly_compares_against_own_scoring_rate() {
        let r = record(5, 0);
        let form = FormFeatures {
            home_avg_goals_scored: 1.2,
            away_avg_goals_scored: 1.0,
            ..Default::default()
        };
        let flags = deriver().flag(&r, &form, &derive_measures(&r), None);
        assert_eq!(flags.goals_anomaly_home, Some(true));
        assert_eq!(flags.goals_anomaly_away, Some(false));

        let normal = record(4, 0);
        let flags = deriver().flag(&normal, &form, &derive_measures(&normal), None);
        assert_eq!(flags.goals_anomaly_home, Some(false));
    }

    #[test]
    fn extreme_counts_saturate() {
        let mut r = record(u32::MAX, 1);
        r.stats.home_yellow_cards = Some(u32::MAX);
        r.stats.away_yellow_cards = Some(3);
        let m = derive_measures(&r);
        assert_eq!(m.total_goals, u32::MAX);
        assert_eq!(m.goal_difference, i32::MAX);
        assert_eq!(m.total_cards, Some(u32::MAX));
    }

    #[test]
    fn half_time_lead_overturned() {
        let mut r = record(1, 2);
        r.ht_home_goals = Some(1);
        r.ht_away_goals = Some(0);
        r.ht_result = Some(MatchOutcome::Home);
        let m = derive_measures(&r);
        assert_eq!(m.ht_total_goals, Some(1));
        assert_eq!(m.ht_result_changed, Some(true));
    }

    #[test]
    fn cards_flag_uses_dataset_statistics() {
        let measures: Vec<MatchMeasures> = [3, 4, 3, 5, 4, 3, 4, 12]
            .iter()
            .map(|&c| MatchMeasures {
                total_cards: Some(c),
                ..Default::default()
            })
            .collect();
        let stats = CardStats::from_measures(&measures).unwrap();
        assert!(stats.z_score(12) > 2.0);
        assert!(stats.z_score(5) < 2.0);

        let uniform: Vec<MatchMeasures> = (0..4)
            .map(|_| MatchMeasures {
                total_cards: Some(4),
                ..Default::default()
            })
            .collect();
        assert!(CardStats::from_measures(&uniform).is_none());
    }

    #[test]
    fn total_cards_includes_reds_when_present() {
        let mut r = record(0, 0);
        r.stats.home_yellow_cards = Some(2);
        r.stats.away_yellow_cards = Some(3);
        assert_eq!(derive_measures(&r).total_cards, Some(5));
        r.stats.home_red_cards = Some(1);
        r.stats.away_red_cards = Some(0);
        assert_eq!(derive_measures(&r).total_cards, Some(6));
    }
}

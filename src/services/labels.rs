use crate::config::LabelThresholds;
use crate::models::ProcessedMatch;
use crate::utils::{mean_and_std, quantile};

/// Training labels plus the dataset statistics they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    pub labels: Vec<bool>,
    pub odds_movement_cutoff: Option<f64>,
    pub goals_mean: Option<f64>,
    pub goals_std: Option<f64>,
}

impl LabelSet {
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.positives() as f64 / self.labels.len() as f64
    }

    /// True when both classes are present.
    pub fn is_balanced_enough(&self) -> bool {
        let positives = self.positives();
        positives > 0 && positives < self.labels.len()
    }
}

/// Manufactures a "suspicious" training target from accumulated statistical evidence.
///
/// Training-time only: the result depends on dataset-wide statistics and is never used to score.
pub struct SyntheticLabeler {
    thresholds: LabelThresholds,
}

impl SyntheticLabeler {
    pub fn new(thresholds: LabelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn label(&self, matches: &[ProcessedMatch]) -> LabelSet {
        let t = &self.thresholds;

        let movements: Vec<f64> = matches
            .iter()
            .filter_map(|m| m.measures.odds_movement_abs_max)
            .collect();
        let odds_movement_cutoff = quantile(&movements, t.odds_movement_quantile);

        let goals: Vec<f64> = matches
            .iter()
            .map(|m| f64::from(m.measures.total_goals))
            .collect();
        let goal_stats = mean_and_std(&goals).filter(|(_, std)| *std > 0.0);

        let labels = matches
            .iter()
            .map(|m| {
                let many_flags = m.flags.total_flags >= t.min_flags;
                let odds_spike = match (m.measures.odds_movement_abs_max, odds_movement_cutoff) {
                    (Some(movement), Some(cutoff)) => movement > cutoff,
                    _ => false,
                };
                let goals_outlier = goal_stats.is_some_and(|(mean, std)| {
                    ((f64::from(m.measures.total_goals) - mean) / std).abs() > t.goals_z_threshold
                });
                many_flags || odds_spike || goals_outlier
            })
            .collect();

        let set = LabelSet {
            labels,
            odds_movement_cutoff,
            goals_mean: goal_stats.map(|(mean, _)| mean),
            goals_std: goal_stats.map(|(_, std)| std),
        };

        tracing::info!(
            "Synthesised labels: {} suspicious of {} ({:.1}%)",
            set.positives(),
            set.labels.len(),
            set.positive_rate() * 100.0
        );
        if !set.is_balanced_enough() {
            tracing::warn!("Synthetic labels contain a single class; classifiers will degrade to a constant");
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyFlags, FormFeatures, MatchMeasures, MatchRecord};
    use chrono::NaiveDate;

    fn processed(goals: u32, movement: Option<f64>, flags: u32) -> ProcessedMatch {
        ProcessedMatch {
            record: MatchRecord::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "A", "B", goals, 0),
            form: FormFeatures::default(),
            measures: MatchMeasures {
                total_goals: goals,
                odds_movement_abs_max: movement,
                ..Default::default()
            },
            flags: AnomalyFlags {
                total_flags: flags,
                ..Default::default()
            },
        }
    }

    fn labeler() -> SyntheticLabeler {
        SyntheticLabeler::new(LabelThresholds::default())
    }

    #[test]
    fn three_flags_make_a_positive() {
        let matches: Vec<ProcessedMatch> = (0..10)
            .map(|i| processed(2 + i % 2, None, if i == 4 { 3 } else { 2 }))
            .collect();
        let set = labeler().label(&matches);
        assert_eq!(set.positives(), 1);
        assert!(set.labels[4]);
    }

    #[test]
    fn odds_movement_above_dataset_quantile() {
        let matches: Vec<ProcessedMatch> = (0..40)
            .map(|i| processed(2 + i % 2, Some(if i == 7 { 0.5 } else { 0.01 * (i % 5) as f64 }), 0))
            .collect();
        let set = labeler().label(&matches);
        assert!(set.labels[7]);
        assert_eq!(set.positives(), 1);
        assert!(set.odds_movement_cutoff.unwrap() < 0.5);
    }

    #[test]
    fn extreme_goal_totals_are_positive() {
        let mut matches: Vec<ProcessedMatch> = (0..30).map(|i| processed(2 + i % 2, None, 0)).collect();
        matches.push(processed(11, None, 0));
        let set = labeler().label(&matches);
        assert!(set.labels[30]);
        assert_eq!(set.positives(), 1);
    }

    #[test]
    fn constant_goals_never_trigger_the_z_rule() {
        let matches: Vec<ProcessedMatch> = (0..10).map(|_| processed(2, None, 0)).collect();
        let set = labeler().label(&matches);
        assert_eq!(set.positives(), 0);
        assert!(set.goals_std.is_none());
        assert!(!set.is_balanced_enough());
    }

    #[test]
    fn labels_are_reproducible() {
        let matches: Vec<ProcessedMatch> = (0..25)
            .map(|i| processed(i % 6, Some(0.02 * i as f64), i % 4))
            .collect();
        assert_eq!(labeler().label(&matches), labeler().label(&matches));
    }
}

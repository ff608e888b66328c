use crate::config::{AlertThresholds, EnsembleWeights, IntegrityConfig};
use crate::models::{AlertLevel, ComponentScores};

/// Fixed-weight combination of the component scores and its alert bucketing. Pure and stateless.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCombiner {
    weights: EnsembleWeights,
    alerts: AlertThresholds,
}

impl ScoreCombiner {
    pub fn new(weights: EnsembleWeights, alerts: AlertThresholds) -> Self {
        Self { weights, alerts }
    }

    pub fn from_config(config: &IntegrityConfig) -> Self {
        Self::new(config.weights, config.alerts)
    }

    /// `100 * weighted sum`, clamped to [0, 100].
    pub fn integrity_score(&self, scores: &ComponentScores) -> f64 {
        let w = &self.weights;
        let combined = w.outlier * scores.outlier + w.classifier1 * scores.classifier1 + w.classifier2 * scores.classifier2;
        (100.0 * combined).clamp(0.0, 100.0)
    }

    /// Buckets are inclusive on their upper edge.
    pub fn alert_level(&self, score: f64) -> AlertLevel {
        let a = &self.alerts;
        if score <= a.normal_max {
            AlertLevel::Normal
        } else if score <= a.monitor_max {
            AlertLevel::Monitor
        } else if score <= a.suspicious_max {
            AlertLevel::Suspicious
        } else {
            AlertLevel::HighAlert
        }
    }

    pub fn combine(&self, scores: &ComponentScores) -> (f64, AlertLevel) {
        let score = self.integrity_score(scores);
        (score, self.alert_level(score))
    }
}

impl Default for ScoreCombiner {
    fn default() -> Self {
        Self::new(EnsembleWeights::default(), AlertThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(outlier: f64, classifier1: f64, classifier2: f64) -> ComponentScores {
        ComponentScores {
            outlier,
            classifier1,
            classifier2,
        }
    }

    #[test]
    fn alert_boundaries_are_upper_inclusive() {
        let c = ScoreCombiner::default();
        assert_eq!(c.alert_level(0.0), AlertLevel::Normal);
        assert_eq!(c.alert_level(30.0), AlertLevel::Normal);
        assert_eq!(c.alert_level(30.0001), AlertLevel::Monitor);
        assert_eq!(c.alert_level(60.0), AlertLevel::Monitor);
        assert_eq!(c.alert_level(60.0001), AlertLevel::Suspicious);
        assert_eq!(c.alert_level(80.0), AlertLevel::Suspicious);
        assert_eq!(c.alert_level(80.0001), AlertLevel::HighAlert);
        assert_eq!(c.alert_level(100.0), AlertLevel::HighAlert);
    }

    #[test]
    fn weighted_sum_scaled_to_percent() {
        let c = ScoreCombiner::default();
        assert!((c.integrity_score(&components(1.0, 0.0, 0.0)) - 35.0).abs() < 1e-9);
        assert!((c.integrity_score(&components(0.0, 1.0, 0.0)) - 40.0).abs() < 1e-9);
        assert!((c.integrity_score(&components(0.0, 0.0, 1.0)) - 25.0).abs() < 1e-9);
        assert!((c.integrity_score(&components(1.0, 1.0, 1.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_range_with_oversized_weights() {
        let weights = EnsembleWeights {
            outlier: 1.0,
            classifier1: 1.0,
            classifier2: 1.0,
        };
        let c = ScoreCombiner::new(weights, AlertThresholds::default());
        let (score, level) = c.combine(&components(1.0, 1.0, 1.0));
        assert_eq!(score, 100.0);
        assert_eq!(level, AlertLevel::HighAlert);
        assert_eq!(c.integrity_score(&components(0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn alert_level_is_monotonic_in_score() {
        let c = ScoreCombiner::default();
        let mut previous = AlertLevel::Normal;
        for step in 0..=1000 {
            let level = c.alert_level(step as f64 / 10.0);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn custom_boundaries_are_honoured() {
        let alerts = AlertThresholds {
            normal_max: 10.0,
            monitor_max: 20.0,
            suspicious_max: 50.0,
        };
        let c = ScoreCombiner::new(EnsembleWeights::default(), alerts);
        assert_eq!(c.alert_level(15.0), AlertLevel::Monitor);
        assert_eq!(c.alert_level(50.0), AlertLevel::Suspicious);
        assert_eq!(c.alert_level(51.0), AlertLevel::HighAlert);
    }
}

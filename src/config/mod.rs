use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{IntegrityError, Result};

/// Thresholds used by the anomaly flag deriver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagThresholds {
    /// Max absolute fractional open→close movement above which odds are flagged.
    pub odds_movement_threshold: f64,
    /// Home win streak that must be broken by an away win.
    pub min_win_streak: u32,
    pub goals_anomaly_multiplier: f64,
    pub cards_z_threshold: f64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            odds_movement_threshold: 0.15,
            min_win_streak: 5,
            goals_anomaly_multiplier: 4.0,
            cards_z_threshold: 2.0,
        }
    }
}

/// Thresholds for the training-time synthetic label heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelThresholds {
    pub min_flags: u32,
    pub odds_movement_quantile: f64,
    pub goals_z_threshold: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            min_flags: 3,
            odds_movement_quantile: 0.95,
            goals_z_threshold: 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleWeights {
    pub outlier: f64,
    pub classifier1: f64,
    pub classifier2: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            outlier: 0.35,
            classifier1: 0.40,
            classifier2: 0.25,
        }
    }
}

/// Upper (inclusive) score edge of each alert bucket; anything above `suspicious_max` is high alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub normal_max: f64,
    pub monitor_max: f64,
    pub suspicious_max: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            normal_max: 30.0,
            monitor_max: 60.0,
            suspicious_max: 80.0,
        }
    }
}

/// Sub-model hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub contamination: f64,
    pub outlier_trees: usize,
    pub outlier_max_samples: usize,
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub forest_min_samples_leaf: usize,
    pub logistic_max_iter: usize,
    pub logistic_c: f64,
    pub test_size: f64,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            contamination: 0.08,
            outlier_trees: 200,
            outlier_max_samples: 256,
            forest_trees: 200,
            forest_max_depth: 10,
            forest_min_samples_leaf: 5,
            logistic_max_iter: 100,
            logistic_c: 1.0,
            test_size: 0.2,
            seed: 42,
        }
    }
}

pub const DEFAULT_FEATURES: &[&str] = &[
    "odds_movement_abs_max",
    "result_surprise",
    "ht_result_changed",
    "total_goals",
    "total_cards",
    "flag_odds_movement",
    "flag_result_surprise",
    "flag_streak_break",
    "flag_goals_anomaly_home",
    "flag_goals_anomaly_away",
    "flag_ht_result_changed",
    "flag_cards_anomaly",
];

pub const DEFAULT_MODEL_PREFIX: &str = "fps_leagues";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub flags: FlagThresholds,
    pub labels: LabelThresholds,
    pub weights: EnsembleWeights,
    pub alerts: AlertThresholds,
    pub model: ModelParams,
    pub features: Vec<String>,
    pub model_dir: PathBuf,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            flags: FlagThresholds::default(),
            labels: LabelThresholds::default(),
            weights: EnsembleWeights::default(),
            alerts: AlertThresholds::default(),
            model: ModelParams::default(),
            features: DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect(),
            model_dir: PathBuf::from("models/trained"),
        }
    }
}

impl IntegrityConfig {
    /// Defaults, then an optional JSON file (explicit path or `INTEGRITY_CONFIG`), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("INTEGRITY_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(file) => {
                tracing::info!("Loading configuration from {}", file.display());
                Self::from_json_file(&file)?
            }
            None => Self::default(),
        };

        if let Ok(dir) = env::var("INTEGRITY_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        if w.outlier < 0.0 || w.classifier1 < 0.0 || w.classifier2 < 0.0 {
            return Err(IntegrityError::Configuration(
                "ensemble weights must be non-negative".to_string(),
            ));
        }
        let total = w.outlier + w.classifier1 + w.classifier2;
        if total <= 0.0 {
            return Err(IntegrityError::Configuration(
                "ensemble weights must not all be zero".to_string(),
            ));
        }
        if (total - 1.0).abs() > 1e-6 {
            tracing::warn!("Ensemble weights sum to {:.3}; scores are clamped to [0, 100]", total);
        }

        let a = &self.alerts;
        if !(a.normal_max < a.monitor_max && a.monitor_max < a.suspicious_max) {
            return Err(IntegrityError::Configuration(format!(
                "alert boundaries must be strictly increasing (got {}, {}, {})",
                a.normal_max, a.monitor_max, a.suspicious_max
            )));
        }

        let m = &self.model;
        if !(m.contamination > 0.0 && m.contamination <= 0.5) {
            return Err(IntegrityError::Configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                m.contamination
            )));
        }
        if !(m.test_size > 0.0 && m.test_size < 1.0) {
            return Err(IntegrityError::Configuration(format!(
                "test_size must be in (0, 1), got {}",
                m.test_size
            )));
        }
        if m.outlier_trees == 0 || m.forest_trees == 0 {
            return Err(IntegrityError::Configuration(
                "tree ensembles need at least one tree".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.labels.odds_movement_quantile) {
            return Err(IntegrityError::Configuration(
                "odds_movement_quantile must be within [0, 1]".to_string(),
            ));
        }
        if self.features.is_empty() {
            return Err(IntegrityError::Configuration(
                "at least one feature must be requested".to_string(),
            ));
        }

        Ok(())
    }
}

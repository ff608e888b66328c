use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{IntegrityConfig, LabelThresholds, ModelParams};
use crate::error::{IntegrityError, Result};
use crate::learners::{
    evaluate_classifier, stratified_split, ClassifierMetrics, IsolationForest, LogisticRegression, RandomForest,
    ScoreBounds, Standardizer, SubModel, TrainingSet,
};
use crate::models::{ComponentScores, ProcessedMatch};
use crate::services::features::FeatureSchema;
use crate::services::labels::SyntheticLabeler;
use crate::store::{load_bundle, save_bundle};

pub const BUNDLE_VERSION: u32 = 1;

/// Fit-time summary stored alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub positives: usize,
    pub positive_rate: f64,
    pub dropped_features: Vec<String>,
    pub outlier_bounds: Option<ScoreBounds>,
    /// Raw isolation score above which a match counts as an outlier.
    pub outlier_threshold: Option<f64>,
    /// Share of the training batch above the contamination threshold.
    pub outlier_flagged_share: f64,
    pub random_forest: ClassifierMetrics,
    pub logistic_regression: ClassifierMetrics,
    pub feature_importances: Vec<(String, f64)>,
}

/// Everything needed to score again: written and read as one artifact per prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: u32,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub standardizer: Standardizer,
    pub outlier: IsolationForest,
    pub classifier1: RandomForest,
    pub classifier2: LogisticRegression,
    pub report: TrainingReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub version: u32,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub report: TrainingReport,
}

#[derive(Debug, Clone)]
struct FittedEnsemble {
    schema: FeatureSchema,
    bundle: ModelBundle,
}

impl FittedEnsemble {
    fn from_bundle(bundle: ModelBundle) -> Result<Self> {
        if bundle.version != BUNDLE_VERSION {
            return Err(IntegrityError::Configuration(format!(
                "unsupported model bundle version {} (expected {})",
                bundle.version, BUNDLE_VERSION
            )));
        }
        let schema = FeatureSchema::from_names(&bundle.feature_names)?;
        if bundle.standardizer.width() != schema.len() {
            return Err(IntegrityError::Configuration(format!(
                "bundle standardizer covers {} features but lists {} names",
                bundle.standardizer.width(),
                schema.len()
            )));
        }
        if !(bundle.outlier.is_fitted() && bundle.classifier1.is_fitted() && bundle.classifier2.is_fitted()) {
            return Err(IntegrityError::NotFitted);
        }
        Ok(Self { schema, bundle })
    }

    fn members(&self) -> [&dyn SubModel; 3] {
        [&self.bundle.outlier, &self.bundle.classifier1, &self.bundle.classifier2]
    }

    /// Component scores of one raw (unstandardized) vector in schema order.
    fn score_vector(&self, raw: &[f64]) -> Result<ComponentScores> {
        let row = self.bundle.standardizer.transform_row(raw)?;
        let [outlier, classifier1, classifier2] = self.members();
        Ok(ComponentScores {
            outlier: outlier.score(&row)?,
            classifier1: classifier1.score(&row)?,
            classifier2: classifier2.score(&row)?,
        })
    }
}

/// The three-member ensemble over one standardized feature space.
///
/// Read-only once fitted or loaded; scoring never changes any parameter.
#[derive(Debug, Clone)]
pub struct EnsembleModel {
    params: ModelParams,
    labels: LabelThresholds,
    requested: Vec<String>,
    fitted: Option<FittedEnsemble>,
}

impl EnsembleModel {
    pub fn new(params: ModelParams, labels: LabelThresholds, requested: Vec<String>) -> Self {
        Self {
            params,
            labels,
            requested,
            fitted: None,
        }
    }

    pub fn from_config(config: &IntegrityConfig) -> Self {
        Self::new(config.model.clone(), config.labels.clone(), config.features.clone())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn feature_names(&self) -> Result<Vec<String>> {
        Ok(self.state()?.schema.names())
    }

    pub fn report(&self) -> Result<&TrainingReport> {
        Ok(&self.state()?.bundle.report)
    }

    pub fn summary(&self) -> Result<ModelSummary> {
        let bundle = &self.state()?.bundle;
        Ok(ModelSummary {
            version: bundle.version,
            run_id: bundle.run_id,
            created_at: bundle.created_at,
            feature_names: bundle.feature_names.clone(),
            report: bundle.report.clone(),
        })
    }

    /// Fit standardizer, outlier detector and both classifiers on processed history.
    pub fn fit(&mut self, matches: &[ProcessedMatch]) -> Result<&TrainingReport> {
        if matches.is_empty() {
            return Err(IntegrityError::EmptyDataset);
        }
        let p = &self.params;

        let schema = FeatureSchema::resolve(&self.requested, matches)?;
        let kept = schema.names();
        let mut dropped: Vec<String> = self.requested.iter().filter(|r| !kept.contains(r)).cloned().collect();
        dropped.dedup();

        let raw = schema.matrix(matches);
        let standardizer = Standardizer::fit(&raw)?;
        let z = standardizer.transform(&raw)?;

        let label_set = SyntheticLabeler::new(self.labels.clone()).label(matches);
        let labels = &label_set.labels;
        let (train_idx, test_idx) = stratified_split(labels, p.test_size, p.seed);
        let z_train = z.select_rows(&train_idx);
        let y_train: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();

        let mut outlier = IsolationForest::new(p.outlier_trees, p.outlier_max_samples, p.contamination, p.seed);
        let mut classifier1 = RandomForest::new(p.forest_trees, p.forest_max_depth, p.forest_min_samples_leaf, p.seed);
        let mut classifier2 = LogisticRegression::new(p.logistic_max_iter, p.logistic_c);

        let everything = TrainingSet::new(&z, labels);
        let train = TrainingSet::new(&z_train, &y_train);
        let (outlier_fit, (forest_fit, logistic_fit)) = rayon::join(
            || outlier.fit(&everything),
            || rayon::join(|| classifier1.fit(&train), || classifier2.fit(&train)),
        );
        for (member, fitted) in [
            (outlier.name(), outlier_fit),
            (classifier1.name(), forest_fit),
            (classifier2.name(), logistic_fit),
        ] {
            if let Err(e) = &fitted {
                tracing::error!("Fitting {} failed: {}", member, e);
            }
            fitted?;
        }

        let (z_test, y_test) = (z.select_rows(&test_idx), test_idx.iter().map(|&i| labels[i]).collect::<Vec<_>>());
        let random_forest = evaluate_classifier(&classifier1.score_matrix(&z_test)?, &y_test);
        let logistic_regression = evaluate_classifier(&classifier2.score_matrix(&z_test)?, &y_test);

        let flagged = (0..z.nrows())
            .map(|i| row_of(&z, i))
            .map(|row| outlier.raw_score(&row).map(|raw| outlier.is_outlier(raw)))
            .collect::<Result<Vec<bool>>>()?
            .into_iter()
            .filter(|f| *f)
            .count();

        let report = TrainingReport {
            samples: matches.len(),
            train_samples: train_idx.len(),
            test_samples: test_idx.len(),
            positives: label_set.positives(),
            positive_rate: label_set.positive_rate(),
            dropped_features: dropped,
            outlier_bounds: outlier.bounds(),
            outlier_threshold: outlier.threshold(),
            outlier_flagged_share: flagged as f64 / z.nrows() as f64,
            random_forest,
            logistic_regression,
            feature_importances: kept.iter().cloned().zip(classifier1.feature_importances().iter().copied()).collect(),
        };

        tracing::info!(
            "Fitted ensemble on {} matches ({} features, {} train / {} test, {:.1}% positive)",
            report.samples,
            kept.len(),
            report.train_samples,
            report.test_samples,
            report.positive_rate * 100.0
        );
        log_metrics(classifier1.name(), &report.random_forest);
        log_metrics(classifier2.name(), &report.logistic_regression);

        let bundle = ModelBundle {
            version: BUNDLE_VERSION,
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_names: kept,
            standardizer,
            outlier,
            classifier1,
            classifier2,
            report,
        };
        let fitted = self.fitted.insert(FittedEnsemble { schema, bundle });
        Ok(&fitted.bundle.report)
    }

    /// Component scores for every match. Fails if a required feature is not covered.
    pub fn score_matches(&self, matches: &[ProcessedMatch]) -> Result<Vec<ComponentScores>> {
        let state = self.state()?;
        state.schema.check_coverage(matches)?;
        matches
            .iter()
            .map(|m| state.score_vector(&state.schema.vectorize(m)))
            .collect()
    }

    /// Single-match scoring; uses exactly the same path and bounds as `score_matches`.
    pub fn score_match(&self, m: &ProcessedMatch) -> Result<ComponentScores> {
        let state = self.state()?;
        state.schema.check_coverage(std::slice::from_ref(m))?;
        state.score_vector(&state.schema.vectorize(m))
    }

    /// Score caller-supplied named feature values.
    pub fn score_values(&self, values: &HashMap<String, f64>) -> Result<ComponentScores> {
        let state = self.state()?;
        state.score_vector(&state.schema.vector_from_values(values)?)
    }

    pub fn save(&self, model_dir: &Path, prefix: &str) -> Result<PathBuf> {
        save_bundle(model_dir, prefix, &self.state()?.bundle)
    }

    pub fn load(config: &IntegrityConfig, prefix: &str) -> Result<Self> {
        let bundle: ModelBundle = load_bundle(&config.model_dir, prefix)?;
        let fitted = FittedEnsemble::from_bundle(bundle)?;
        tracing::info!(
            "Model '{}' (run {}) expects features: {}",
            prefix,
            fitted.bundle.run_id,
            fitted.bundle.feature_names.join(", ")
        );
        Ok(Self {
            params: config.model.clone(),
            labels: config.labels.clone(),
            requested: fitted.bundle.feature_names.clone(),
            fitted: Some(fitted),
        })
    }

    fn state(&self) -> Result<&FittedEnsemble> {
        self.fitted.as_ref().ok_or(IntegrityError::NotFitted)
    }
}

fn row_of(matrix: &DMatrix<f64>, i: usize) -> Vec<f64> {
    matrix.row(i).iter().copied().collect()
}

fn log_metrics(name: &str, m: &ClassifierMetrics) {
    match m.auc {
        Some(auc) => tracing::info!(
            "{}: AUC {:.3}, precision {:.3}, recall {:.3}, F1 {:.3} on {} held-out matches",
            name,
            auc,
            m.precision,
            m.recall,
            m.f1,
            m.samples
        ),
        None => tracing::info!(
            "{}: held-out set has a single class; precision {:.3}, recall {:.3}",
            name,
            m.precision,
            m.recall
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyFlags, FormFeatures, MatchMeasures, MatchRecord};
    use chrono::NaiveDate;

    fn small_params() -> ModelParams {
        ModelParams {
            outlier_trees: 50,
            forest_trees: 20,
            ..Default::default()
        }
    }

    fn processed(i: u32) -> ProcessedMatch {
        let goals = if i % 17 == 0 { 8 } else { i % 4 };
        let cards = if i % 13 == 0 { 11 } else { 3 + i % 3 };
        let movement = if i % 11 == 0 { 0.3 } else { 0.01 * (i % 6) as f64 };
        let flags = AnomalyFlags {
            odds_movement: Some(movement > 0.15),
            result_surprise: Some(i % 5 == 0),
            streak_break: Some(false),
            goals_anomaly_home: Some(goals > 6),
            goals_anomaly_away: Some(false),
            ht_result_changed: Some(i % 7 == 0),
            cards_anomaly: Some(cards > 10),
            total_flags: 0,
        };
        let total_flags = flags.count_raised();
        ProcessedMatch {
            record: MatchRecord::new(NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(), &format!("H{}", i), "Away", goals, 0),
            form: FormFeatures::default(),
            measures: MatchMeasures {
                odds_movement_abs_max: Some(movement),
                result_surprise: Some(i % 5 == 0),
                ht_result_changed: Some(i % 7 == 0),
                total_goals: goals,
                total_cards: Some(cards),
                ..Default::default()
            },
            flags: AnomalyFlags { total_flags, ..flags },
        }
    }

    fn history() -> Vec<ProcessedMatch> {
        (0..90).map(processed).collect()
    }

    fn fitted_model() -> EnsembleModel {
        let config = IntegrityConfig::default();
        let mut model = EnsembleModel::new(small_params(), config.labels.clone(), config.features.clone());
        model.fit(&history()).unwrap();
        model
    }

    #[test]
    fn unfitted_model_refuses_everything() {
        let config = IntegrityConfig::default();
        let model = EnsembleModel::from_config(&config);
        assert!(matches!(model.score_match(&processed(1)), Err(IntegrityError::NotFitted)));
        assert!(matches!(model.save(&std::env::temp_dir(), "never"), Err(IntegrityError::NotFitted)));
    }

    #[test]
    fn fit_produces_report_and_bounded_scores() {
        let model = fitted_model();
        let report = model.report().unwrap();
        assert_eq!(report.samples, 90);
        assert_eq!(report.train_samples + report.test_samples, 90);
        assert!(report.positives > 0);
        assert!(report.dropped_features.is_empty());
        assert_eq!(report.feature_importances.len(), 12);
        let bounds = report.outlier_bounds.unwrap();
        let cut = report.outlier_threshold.unwrap();
        assert!(bounds.min <= cut && cut <= bounds.max);

        for scores in model.score_matches(&history()).unwrap() {
            for s in [scores.outlier, scores.classifier1, scores.classifier2] {
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }

    #[test]
    fn single_scoring_is_idempotent_and_matches_batch() {
        let model = fitted_model();
        let history = history();
        let batch = model.score_matches(&history).unwrap();

        let probe = processed(34);
        let first = model.score_match(&probe).unwrap();
        let second = model.score_match(&probe).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, batch[34]);

        // Scoring an unseen extreme row uses the fit-time bounds, never rescaling the batch.
        let bounds = model.report().unwrap().outlier_bounds;
        let mut extreme = processed(1);
        extreme.measures.total_goals = 40;
        let _ = model.score_match(&extreme).unwrap();
        assert_eq!(model.report().unwrap().outlier_bounds, bounds);
        assert_eq!(model.score_matches(&history).unwrap(), batch);
    }

    #[test]
    fn missing_required_columns_fail_scoring() {
        let model = fitted_model();
        let mut no_odds = processed(2);
        no_odds.measures.odds_movement_abs_max = None;
        no_odds.measures.total_cards = None;
        let err = model.score_match(&no_odds).unwrap_err();
        match err {
            IntegrityError::FeatureMismatch { missing } => {
                assert_eq!(missing, vec!["odds_movement_abs_max".to_string(), "total_cards".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }

        // Optional engineered flags default to 0 instead.
        let mut no_flags = processed(2);
        no_flags.flags = AnomalyFlags::default();
        no_flags.measures.result_surprise = None;
        assert!(model.score_match(&no_flags).is_ok());
    }

    #[test]
    fn unknown_feature_aborts_fit() {
        let config = IntegrityConfig::default();
        let mut model = EnsembleModel::new(small_params(), config.labels.clone(), vec!["total_goals".into(), "vibes".into()]);
        assert!(matches!(model.fit(&history()), Err(IntegrityError::MissingFeature(_))));
        assert!(!model.is_fitted());
    }

    #[test]
    fn unavailable_features_only_is_a_configuration_error() {
        let config = IntegrityConfig::default();
        let mut model = EnsembleModel::new(small_params(), config.labels.clone(), vec!["total_shots".into()]);
        assert!(matches!(model.fit(&history()), Err(IntegrityError::Configuration(_))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let model = fitted_model();
        let dir = std::env::temp_dir().join(format!("integrity-bundle-{}", Uuid::new_v4()));
        let mut config = IntegrityConfig::default();
        config.model_dir = dir.clone();

        let path = model.save(&dir, "round_trip").unwrap();
        assert!(path.ends_with("round_trip.json"));
        let loaded = EnsembleModel::load(&config, "round_trip").unwrap();

        assert_eq!(loaded.feature_names().unwrap(), model.feature_names().unwrap());
        assert_eq!(loaded.summary().unwrap().run_id, model.summary().unwrap().run_id);
        let probe = processed(22);
        let before = model.score_match(&probe).unwrap();
        let after = loaded.score_match(&probe).unwrap();
        assert!((before.outlier - after.outlier).abs() < 1e-12);
        assert!((before.classifier1 - after.classifier1).abs() < 1e-12);
        assert!((before.classifier2 - after.classifier2).abs() < 1e-12);

        assert!(matches!(
            EnsembleModel::load(&config, "missing"),
            Err(IntegrityError::ArtifactNotFound(_))
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn named_values_score_like_the_match_vector() {
        let model = fitted_model();
        let probe = processed(5);
        let names = model.feature_names().unwrap();
        let schema = FeatureSchema::from_names(&names).unwrap();
        let values: HashMap<String, f64> = names.into_iter().zip(schema.vectorize(&probe)).collect();
        assert_eq!(model.score_values(&values).unwrap(), model.score_match(&probe).unwrap());
    }
}

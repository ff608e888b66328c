use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the scoring engine.
///
/// Malformed individual records never surface here: cleaning drops them and logs a count.
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// A requested feature name is not part of the engineered schema.
    #[error("unknown feature column requested: {0}")]
    MissingFeature(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model not fitted; call fit() or load a bundle first")]
    NotFitted,

    /// The input cannot provide every required feature of the fitted schema.
    #[error("feature mismatch: model requires [{}] which the input does not provide", missing.join(", "))]
    FeatureMismatch { missing: Vec<String> },

    #[error("no usable match records after cleaning")]
    EmptyDataset,

    #[error("model bundle not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IntegrityError {
    /// True for errors caused by the caller's input rather than by the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IntegrityError::FeatureMismatch { .. }
                | IntegrityError::MissingFeature(_)
                | IntegrityError::Configuration(_)
                | IntegrityError::EmptyDataset
        )
    }
}

pub type Result<T> = std::result::Result<T, IntegrityError>;

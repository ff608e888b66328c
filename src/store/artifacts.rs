use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{IntegrityError, Result};

/// Location of the bundle stored under `prefix`.
pub fn bundle_path(model_dir: &Path, prefix: &str) -> PathBuf {
    model_dir.join(format!("{}.json", prefix))
}

pub fn save_bundle<T: Serialize>(model_dir: &Path, prefix: &str, bundle: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(model_dir)?;
    let path = bundle_path(model_dir, prefix);
    let json = serde_json::to_string(bundle)?;
    std::fs::write(&path, json)?;
    tracing::info!("Saved model bundle '{}' to {}", prefix, path.display());
    Ok(path)
}

pub fn load_bundle<T: DeserializeOwned>(model_dir: &Path, prefix: &str) -> Result<T> {
    let path = bundle_path(model_dir, prefix);
    if !path.exists() {
        return Err(IntegrityError::ArtifactNotFound(path));
    }
    let raw = std::fs::read_to_string(&path)?;
    let bundle = serde_json::from_str(&raw)?;
    tracing::info!("Loaded model bundle '{}' from {}", prefix, path.display());
    Ok(bundle)
}

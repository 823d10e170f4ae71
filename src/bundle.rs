//! Versioned Artifact Bundle
//!
//! Resolves a model version to its on-disk artifacts (metadata, scaler,
//! label encoder, classifiers), loads them once, and owns them immutably
//! for the lifetime of the process. A bundle that cannot be completed is a
//! startup failure; there is no partial state to serve from.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array1;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::features;
use crate::models::{Classifier, ModelEnsemble, ModelKind};
use crate::TriageError;

/// Contents of `metadata_v{version}.json`, written by the training
/// pipeline. Declares the feature order, label vocabulary, and which
/// classifier files belong to this version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Opaque version identifier.
    pub version: String,
    /// Ordered feature names; positional meaning of every vector.
    pub feature_columns: Vec<String>,
    /// Class labels the label encoder can produce.
    pub attack_types: Vec<String>,
    /// Manifest of model names trained for this version.
    pub model_types: Vec<String>,
    /// Training timestamp, informational only.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Per-feature centering and scaling statistics, applied positionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Per-feature mean subtracted before scaling.
    pub mean: Vec<f64>,
    /// Per-feature standard deviation divided out; zero entries are
    /// treated as 1.0 so constant features pass through centered.
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Scale a raw feature vector.
    pub fn transform(&self, raw: &Array1<f64>) -> Result<Array1<f64>, TriageError> {
        if self.mean.len() != raw.len() || self.scale.len() != raw.len() {
            return Err(TriageError::Inference(format!(
                "scaler is fitted for {} features, got {}",
                self.mean.len(),
                raw.len()
            )));
        }

        Ok(raw
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, mean), scale)| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// Maps numeric class indices back to attack-type labels. Must be the same
/// encoder the classifiers were trained against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Class labels in encoder order.
    pub classes: Vec<String>,
}

impl LabelEncoder {
    /// Decode a class index to its label.
    pub fn decode(&self, index: usize) -> Result<&str, TriageError> {
        self.classes.get(index).map(String::as_str).ok_or_else(|| {
            TriageError::Inference(format!(
                "class index {index} outside the {}-class label vocabulary",
                self.classes.len()
            ))
        })
    }

    /// Number of classes in the vocabulary.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Immutable, versioned set of trained models and preprocessing state.
///
/// Constructed once at process start, shared read-only by every prediction
/// request, discarded at shutdown.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    /// Version the artifacts were resolved for.
    pub version: String,
    /// Ordered feature names; the cross-cutting contract with training.
    pub feature_columns: Vec<String>,
    /// Class labels this bundle can predict.
    pub attack_types: Vec<String>,
    /// Feature scaler.
    pub scaler: StandardScaler,
    /// Label encoder.
    pub labels: LabelEncoder,
    /// Loaded classifiers.
    pub ensemble: ModelEnsemble,
}

impl ArtifactBundle {
    /// Load every artifact for `version` from `models_dir`.
    ///
    /// Metadata, scaler and label encoder are required and fail the load
    /// when missing or unparsable. A classifier listed in the manifest but
    /// absent on disk is skipped with a warning, shrinking the available
    /// model set; a load with no usable classifiers at all fails.
    pub fn load(models_dir: impl AsRef<Path>, version: &str) -> Result<Self, TriageError> {
        let dir = models_dir.as_ref();
        tracing::info!(dir = %dir.display(), version, "loading artifact bundle");

        let metadata: BundleMetadata = read_json(&dir.join(format!("metadata_v{version}.json")))?;
        let scaler: StandardScaler = read_json(&dir.join(format!("scaler_v{version}.json")))?;
        let labels: LabelEncoder = read_json(&dir.join(format!("label_encoder_v{version}.json")))?;

        for column in &metadata.feature_columns {
            if !features::is_known_feature(column) {
                tracing::warn!(
                    %column,
                    "feature column is not produced by the extractor and will be zero-filled"
                );
            }
        }

        let mut members = BTreeMap::new();
        for name in &metadata.model_types {
            let kind = match ModelKind::from_name(name) {
                // The combined model is the soft vote over the loaded
                // members; it has no file of its own.
                Some(ModelKind::Ensemble) => continue,
                Some(kind) => kind,
                None => {
                    tracing::warn!(model = %name, "unrecognized model type in manifest, skipping");
                    continue;
                }
            };

            let path = dir.join(format!("{name}_v{version}.json"));
            if !path.exists() {
                tracing::warn!(
                    model = %name,
                    path = %path.display(),
                    "classifier listed in manifest but absent on disk, skipping"
                );
                continue;
            }
            let classifier: Classifier = read_json(&path)?;
            members.insert(kind, classifier);
        }

        if members.is_empty() {
            return Err(TriageError::Model(format!(
                "no classifiers could be loaded for version {version}"
            )));
        }

        tracing::info!(
            version = %metadata.version,
            models = members.len(),
            classes = labels.len(),
            "artifact bundle ready"
        );

        Ok(Self {
            version: metadata.version,
            feature_columns: metadata.feature_columns,
            attack_types: metadata.attack_types,
            scaler,
            labels,
            ensemble: ModelEnsemble::new(members),
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TriageError> {
    let file = File::open(path).map_err(|source| TriageError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| TriageError::ArtifactParse {
        path: path.to_path_buf(),
        source,
    })
}

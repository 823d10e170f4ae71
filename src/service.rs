//! Prediction Service and Batch Orchestration
//!
//! Composes the extractor, scaler, ensemble and risk policy into the
//! URL-in/result-out boundary. Per-request failures become structured
//! error payloads; nothing a single URL does can take down a batch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::Array1;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bundle::ArtifactBundle;
use crate::features::FeatureExtractor;
use crate::models::ModelKind;
use crate::risk::{self, RiskLevel};
use crate::TriageError;

/// Startup configuration for the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Directory the artifact files live in.
    pub models_dir: PathBuf,
    /// Artifact version to resolve at startup.
    pub model_version: String,
    /// Model used when a request names none.
    pub default_model: ModelKind,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            model_version: "1.0.0".to_string(),
            default_model: ModelKind::Ensemble,
        }
    }
}

/// A completed prediction for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// The URL that was classified.
    pub url: String,
    /// Decoded label of the winning class.
    pub predicted_attack_type: String,
    /// Maximum class probability, 0.0 to 1.0.
    pub confidence: f64,
    /// Triage category derived from attack type and confidence.
    pub risk_level: RiskLevel,
    /// Probability per attack type; covers the full vocabulary.
    pub all_probabilities: BTreeMap<String, f64>,
    /// Raw (unscaled) feature values by name.
    pub features: BTreeMap<String, f64>,
    /// Wire name of the model that actually scored the request.
    pub model_used: String,
    /// Version of the artifact bundle.
    pub model_version: String,
    /// Wall-clock time spent on this prediction.
    pub processing_time_ms: f64,
    /// When the prediction completed.
    pub timestamp: DateTime<Utc>,
}

/// A per-request failure, produced instead of a [`PredictionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResult {
    /// The URL the failure belongs to.
    pub url: String,
    /// Human-readable failure description.
    pub error: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Success or error payload for one URL; never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutcome {
    /// The pipeline completed.
    Success(PredictionResult),
    /// The pipeline failed; converted at the service boundary.
    Error(ErrorResult),
}

impl PredictionOutcome {
    /// Whether this outcome carries a completed prediction.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success payload, if any.
    pub fn success(&self) -> Option<&PredictionResult> {
        match self {
            Self::Success(result) => Some(result),
            Self::Error(_) => None,
        }
    }

    /// The error payload, if any.
    pub fn error(&self) -> Option<&ErrorResult> {
        match self {
            Self::Success(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

/// Bundle summary returned by introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Artifact bundle version.
    pub version: String,
    /// Wire names of every scorable model.
    pub available_models: Vec<String>,
    /// Ordered feature columns.
    pub feature_columns: Vec<String>,
    /// Label vocabulary.
    pub attack_types: Vec<String>,
}

/// Cumulative service statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceStats {
    /// Predictions attempted, successes and errors alike.
    pub total_predictions: u64,
    /// Predictions that ended in an error payload.
    pub total_errors: u64,
    /// Total wall-clock time spent predicting, microseconds.
    pub total_latency_us: u64,
}

impl InferenceStats {
    /// Average latency per prediction in microseconds.
    pub fn avg_latency_us(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.total_latency_us as f64 / self.total_predictions as f64
        }
    }
}

/// Stateless-per-call prediction service over one immutable bundle.
pub struct PredictionService {
    bundle: Arc<ArtifactBundle>,
    extractor: FeatureExtractor,
    default_model: ModelKind,
    stats: RwLock<InferenceStats>,
}

impl PredictionService {
    /// Create a service over an already-loaded bundle.
    pub fn new(bundle: Arc<ArtifactBundle>) -> Self {
        Self {
            bundle,
            extractor: FeatureExtractor::new(),
            default_model: ModelKind::Ensemble,
            stats: RwLock::new(InferenceStats::default()),
        }
    }

    /// Load the configured bundle and create a service over it.
    ///
    /// Fails when the bundle cannot be completed; a service without a full
    /// bundle must not start.
    pub fn from_config(config: &PredictorConfig) -> Result<Self, TriageError> {
        let bundle = ArtifactBundle::load(&config.models_dir, &config.model_version)?;
        Ok(Self {
            bundle: Arc::new(bundle),
            extractor: FeatureExtractor::new(),
            default_model: config.default_model,
            stats: RwLock::new(InferenceStats::default()),
        })
    }

    /// Classify a single URL.
    ///
    /// `model_name` may name any manifest model; unrecognized or unloaded
    /// names silently fall back to the ensemble. Failures anywhere in the
    /// pipeline come back as [`PredictionOutcome::Error`], never as a
    /// panic or a propagated error.
    pub fn predict(&self, url: &str, model_name: Option<&str>) -> PredictionOutcome {
        let started = Instant::now();
        let outcome = match self.run(url, model_name, started) {
            Ok(result) => PredictionOutcome::Success(result),
            Err(error) => {
                tracing::warn!(url, error = %error, "prediction failed");
                PredictionOutcome::Error(ErrorResult {
                    url: url.to_string(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                })
            }
        };

        let mut stats = self.stats.write();
        stats.total_predictions += 1;
        stats.total_latency_us += started.elapsed().as_micros() as u64;
        if !outcome.is_success() {
            stats.total_errors += 1;
        }

        outcome
    }

    /// Classify a sequence of URLs, one outcome per input, in input order.
    ///
    /// Items are independent: a URL that fails yields an error payload at
    /// its position without affecting any other item.
    pub fn batch_predict<I, S>(&self, urls: I, model_name: Option<&str>) -> Vec<PredictionOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .map(|url| self.predict(url.as_ref(), model_name))
            .collect()
    }

    /// Summarize the loaded bundle. No side effects.
    pub fn describe_model(&self) -> ModelInfo {
        ModelInfo {
            version: self.bundle.version.clone(),
            available_models: self
                .bundle
                .ensemble
                .available()
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect(),
            feature_columns: self.bundle.feature_columns.clone(),
            attack_types: self.bundle.attack_types.clone(),
        }
    }

    /// Snapshot of the cumulative statistics.
    pub fn stats(&self) -> InferenceStats {
        self.stats.read().clone()
    }

    fn run(
        &self,
        url: &str,
        model_name: Option<&str>,
        started: Instant,
    ) -> Result<PredictionResult, TriageError> {
        let extraction = self.extractor.extract(url);
        let features = extraction.features();

        // Assemble the raw vector in bundle column order; columns the
        // extractor does not produce are zero-filled.
        let raw: Array1<f64> = self
            .bundle
            .feature_columns
            .iter()
            .map(|column| features.get(column).unwrap_or(0.0))
            .collect();
        let scaled = self.bundle.scaler.transform(&raw)?;

        let requested = match model_name {
            Some(name) => ModelKind::from_name(name).unwrap_or_else(|| {
                tracing::debug!(requested = name, "unknown model name, substituting ensemble");
                ModelKind::Ensemble
            }),
            None => self.default_model,
        };
        let kind = self.bundle.ensemble.resolve(requested);

        let (index, distribution) = self.bundle.ensemble.score(kind, scaled.view())?;
        let predicted = self.bundle.labels.decode(index)?.to_string();
        let confidence = distribution.iter().copied().fold(0.0_f64, f64::max);

        let mut all_probabilities = BTreeMap::new();
        for (class_index, probability) in distribution.iter().enumerate() {
            all_probabilities.insert(
                self.bundle.labels.decode(class_index)?.to_string(),
                *probability,
            );
        }

        let risk_level = risk::classify(&predicted, confidence);

        Ok(PredictionResult {
            url: url.to_string(),
            predicted_attack_type: predicted,
            confidence,
            risk_level,
            all_probabilities,
            features: features.to_map(),
            model_used: kind.as_str().to_string(),
            model_version: self.bundle.version.clone(),
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        })
    }
}

//! URL Attack Triage Engine
//!
//! ML-powered classification of URLs observed in network traffic.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      URL TRIAGE ENGINE                             │
//! │                                                                    │
//! │   URL ──▶ FeatureExtractor ──▶ raw vector ──▶ StandardScaler       │
//! │                                                     │              │
//! │                       ┌─────────────────────────────▼───────────┐  │
//! │                       │             MODEL ENSEMBLE              │  │
//! │                       │   random_forest | xgboost | soft vote   │  │
//! │                       └─────────────────────────────┬───────────┘  │
//! │                                                     │              │
//! │          LabelEncoder ◀── class index ◀─────────────┘              │
//! │               │                                                    │
//! │               ▼                                                    │
//! │   (attack type, confidence) ──▶ RiskClassifier ──▶ result          │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Artifacts (metadata, scaler, label encoder, classifiers) are produced by
//! an external training pipeline and loaded once at startup into an
//! immutable [`ArtifactBundle`]; every prediction request shares it
//! read-only. The engine is synchronous: a prediction either completes or
//! fails in place, and batch requests are plain order-preserving loops over
//! independent items.

#![warn(missing_docs)]

pub mod bundle;
pub mod features;
pub mod models;
pub mod risk;
pub mod service;

use std::path::PathBuf;

use thiserror::Error;

pub use bundle::{ArtifactBundle, BundleMetadata, LabelEncoder, StandardScaler};
pub use features::{FeatureExtraction, FeatureExtractor, UrlFeatures};
pub use models::{Classifier, ModelEnsemble, ModelKind};
pub use risk::RiskLevel;
pub use service::{
    ErrorResult, InferenceStats, ModelInfo, PredictionOutcome, PredictionResult,
    PredictionService, PredictorConfig,
};

/// Engine error types
#[derive(Debug, Error)]
pub enum TriageError {
    /// A required artifact file is missing or unreadable. Fatal at startup.
    #[error("artifact {path}: {source}")]
    ArtifactIo {
        /// Path of the artifact that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An artifact file exists but does not parse. Fatal at startup.
    #[error("artifact {path}: {source}")]
    ArtifactParse {
        /// Path of the artifact that failed to parse.
        path: PathBuf,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// The loaded model set is unusable.
    #[error("model error: {0}")]
    Model(String),
    /// A per-request scoring or decoding failure.
    #[error("inference error: {0}")]
    Inference(String),
}

//! Classifier Models and Ensemble Scoring
//!
//! Serialized tree classifiers deserialized from the artifact bundle, plus
//! the soft-voting combination over them. Model files are inference-only:
//! the trees are walked as stored, never refitted.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::TriageError;

/// Names a classifier slot in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Bagged decision-tree classifier.
    RandomForest,
    /// Gradient-boosted tree classifier.
    Xgboost,
    /// Soft-voting combination of every loaded member model.
    Ensemble,
}

impl ModelKind {
    /// Wire name used in the manifest and in prediction requests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::Xgboost => "xgboost",
            Self::Ensemble => "ensemble",
        }
    }

    /// Parse a wire name; `None` for anything unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "random_forest" => Some(Self::RandomForest),
            "xgboost" => Some(Self::Xgboost),
            "ensemble" => Some(Self::Ensemble),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a serialized decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Internal split: inputs with `feature <= threshold` go left,
    /// everything else goes right.
    Split {
        /// Index into the scaled feature vector.
        feature: usize,
        /// Split threshold in scaled-feature space.
        threshold: f64,
        /// Subtree for `value <= threshold`.
        left: Box<TreeNode>,
        /// Subtree for `value > threshold`.
        right: Box<TreeNode>,
    },
    /// Terminal node carrying one value per class.
    Leaf {
        /// Per-class values: probabilities for forest trees, additive raw
        /// scores for boosted trees.
        value: Vec<f64>,
    },
}

/// A single decision tree walked from root to leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Root node.
    pub root: TreeNode,
}

impl DecisionTree {
    /// Walk the tree for `input` and return the leaf values.
    pub fn leaf(&self, input: ArrayView1<'_, f64>) -> Result<&[f64], TriageError> {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = input.get(*feature).copied().ok_or_else(|| {
                        TriageError::Inference(format!(
                            "tree split references feature {feature} outside the {}-dimensional input",
                            input.len()
                        ))
                    })?;
                    node = if value <= *threshold { left } else { right };
                }
                TreeNode::Leaf { value } => return Ok(value),
            }
        }
    }
}

/// Bagged tree classifier: the class distribution is the mean of the member
/// trees' leaf distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    /// Number of classes every leaf distribution must cover.
    pub n_classes: usize,
    /// Member trees.
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    fn predict_proba(&self, input: ArrayView1<'_, f64>) -> Result<Vec<f64>, TriageError> {
        if self.trees.is_empty() {
            return Err(TriageError::Model("forest has no trees".into()));
        }

        let mut accumulated = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf(input)?;
            if leaf.len() != self.n_classes {
                return Err(TriageError::Inference(format!(
                    "leaf carries {} values for a {}-class forest",
                    leaf.len(),
                    self.n_classes
                )));
            }
            for (total, value) in accumulated.iter_mut().zip(leaf) {
                *total += value;
            }
        }

        let count = self.trees.len() as f64;
        for total in &mut accumulated {
            *total /= count;
        }
        Ok(accumulated)
    }
}

/// Gradient-boosted tree classifier: trees emit additive per-class raw
/// scores on top of `base_score`, converted to probabilities via softmax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedModel {
    /// Number of classes.
    pub n_classes: usize,
    /// Initial per-class raw scores.
    pub base_score: Vec<f64>,
    /// Boosting rounds.
    pub trees: Vec<DecisionTree>,
}

impl BoostedModel {
    fn predict_proba(&self, input: ArrayView1<'_, f64>) -> Result<Vec<f64>, TriageError> {
        if self.base_score.len() != self.n_classes {
            return Err(TriageError::Inference(format!(
                "base score carries {} values for a {}-class model",
                self.base_score.len(),
                self.n_classes
            )));
        }

        let mut scores = self.base_score.clone();
        for tree in &self.trees {
            let leaf = tree.leaf(input)?;
            if leaf.len() != self.n_classes {
                return Err(TriageError::Inference(format!(
                    "leaf carries {} values for a {}-class model",
                    leaf.len(),
                    self.n_classes
                )));
            }
            for (score, value) in scores.iter_mut().zip(leaf) {
                *score += value;
            }
        }

        Ok(softmax(&scores))
    }
}

/// A loaded classifier in one of the supported representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Classifier {
    /// Bagged decision trees.
    RandomForest(ForestModel),
    /// Gradient-boosted trees.
    GradientBoosted(BoostedModel),
}

impl Classifier {
    /// Class probability distribution for a scaled feature vector.
    pub fn predict_proba(&self, input: ArrayView1<'_, f64>) -> Result<Vec<f64>, TriageError> {
        match self {
            Self::RandomForest(model) => model.predict_proba(input),
            Self::GradientBoosted(model) => model.predict_proba(input),
        }
    }
}

/// The classifiers loaded for one bundle version, keyed by manifest name.
#[derive(Debug, Clone)]
pub struct ModelEnsemble {
    members: BTreeMap<ModelKind, Classifier>,
}

impl ModelEnsemble {
    /// Wrap the loaded member classifiers.
    pub fn new(members: BTreeMap<ModelKind, Classifier>) -> Self {
        Self { members }
    }

    /// Model kinds this ensemble can score with, the combined model last.
    pub fn available(&self) -> Vec<ModelKind> {
        let mut kinds: Vec<ModelKind> = self.members.keys().copied().collect();
        if !self.members.is_empty() {
            kinds.push(ModelKind::Ensemble);
        }
        kinds
    }

    /// Whether `kind` can be scored with.
    pub fn contains(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Ensemble => !self.members.is_empty(),
            member => self.members.contains_key(&member),
        }
    }

    /// Substitute the combined model for any kind that is not loaded.
    pub fn resolve(&self, requested: ModelKind) -> ModelKind {
        if self.contains(requested) {
            requested
        } else {
            tracing::debug!(requested = %requested, "model not loaded, substituting ensemble");
            ModelKind::Ensemble
        }
    }

    /// Score a scaled feature vector with `kind`.
    ///
    /// Returns the predicted class index (argmax, ties broken toward the
    /// lowest index) and the full probability distribution.
    pub fn score(
        &self,
        kind: ModelKind,
        scaled: ArrayView1<'_, f64>,
    ) -> Result<(usize, Vec<f64>), TriageError> {
        let distribution = match kind {
            ModelKind::Ensemble => self.soft_vote(scaled)?,
            member => self
                .members
                .get(&member)
                .ok_or_else(|| TriageError::Model(format!("model {member} is not loaded")))?
                .predict_proba(scaled)?,
        };

        let index = argmax(&distribution)
            .ok_or_else(|| TriageError::Inference("empty probability distribution".into()))?;
        Ok((index, distribution))
    }

    /// Per-class arithmetic mean of the member distributions, equal weights.
    fn soft_vote(&self, scaled: ArrayView1<'_, f64>) -> Result<Vec<f64>, TriageError> {
        let mut members = self.members.values();
        let first = members
            .next()
            .ok_or_else(|| TriageError::Model("no member models loaded".into()))?;

        let mut accumulated = first.predict_proba(scaled)?;
        let mut count = 1.0;
        for member in members {
            let distribution = member.predict_proba(scaled)?;
            if distribution.len() != accumulated.len() {
                return Err(TriageError::Inference(format!(
                    "member distributions disagree on class count ({} vs {})",
                    distribution.len(),
                    accumulated.len()
                )));
            }
            for (total, p) in accumulated.iter_mut().zip(&distribution) {
                *total += p;
            }
            count += 1.0;
        }

        for total in &mut accumulated {
            *total /= count;
        }
        Ok(accumulated)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest entry; ties break toward the lowest index.
fn argmax(distribution: &[f64]) -> Option<usize> {
    let mut best = 0;
    let mut best_p = *distribution.first()?;
    for (index, &p) in distribution.iter().enumerate().skip(1) {
        if p > best_p {
            best = index;
            best_p = p;
        }
    }
    Some(best)
}

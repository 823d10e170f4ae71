//! End-to-end tests over a small synthetic artifact bundle.

use std::collections::BTreeMap;
use std::sync::Arc;

use urltriage::bundle::{ArtifactBundle, LabelEncoder, StandardScaler};
use urltriage::features::{FeatureExtractor, UrlFeatures};
use urltriage::models::{
    BoostedModel, Classifier, DecisionTree, ForestModel, ModelEnsemble, ModelKind, TreeNode,
};
use urltriage::risk::RiskLevel;
use urltriage::service::PredictionService;

const SPECIAL_CHAR_COUNT: usize = 4;
const SUSPICIOUS_KEYWORD_COUNT: usize = 12;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn leaf(value: Vec<f64>) -> Box<TreeNode> {
    Box::new(TreeNode::Leaf { value })
}

fn split(feature: usize, threshold: f64, left: Box<TreeNode>, right: Box<TreeNode>) -> Box<TreeNode> {
    Box::new(TreeNode::Split {
        feature,
        threshold,
        left,
        right,
    })
}

/// A keyword/metacharacter stump: no suspicious keywords is benign, a few
/// with moderate punctuation is sqli-shaped, heavy punctuation is
/// xss-shaped.
fn attack_stump(benign: Vec<f64>, sqli: Vec<f64>, xss: Vec<f64>) -> TreeNode {
    *split(
        SUSPICIOUS_KEYWORD_COUNT,
        0.5,
        leaf(benign),
        split(SPECIAL_CHAR_COUNT, 10.5, leaf(sqli), leaf(xss)),
    )
}

fn bundle() -> Arc<ArtifactBundle> {
    let columns: Vec<String> = UrlFeatures::NAMES.iter().map(|n| n.to_string()).collect();
    let dims = columns.len();
    assert_eq!(columns[SPECIAL_CHAR_COUNT], "special_char_count");
    assert_eq!(columns[SUSPICIOUS_KEYWORD_COUNT], "suspicious_keyword_count");

    let forest = Classifier::RandomForest(ForestModel {
        n_classes: 3,
        trees: vec![DecisionTree {
            root: attack_stump(
                vec![0.92, 0.05, 0.03],
                vec![0.05, 0.75, 0.20],
                vec![0.02, 0.03, 0.95],
            ),
        }],
    });
    let boosted = Classifier::GradientBoosted(BoostedModel {
        n_classes: 3,
        base_score: vec![0.0, 0.0, 0.0],
        trees: vec![DecisionTree {
            root: attack_stump(vec![3.0, 0.0, 0.0], vec![0.0, 3.0, 0.0], vec![0.0, 0.0, 3.0]),
        }],
    });

    let mut members = BTreeMap::new();
    members.insert(ModelKind::RandomForest, forest);
    members.insert(ModelKind::Xgboost, boosted);

    Arc::new(ArtifactBundle {
        version: "1.0.0".to_string(),
        feature_columns: columns,
        attack_types: vec!["benign".into(), "sqli".into(), "xss".into()],
        scaler: StandardScaler {
            mean: vec![0.0; dims],
            scale: vec![1.0; dims],
        },
        labels: LabelEncoder {
            classes: vec!["benign".into(), "sqli".into(), "xss".into()],
        },
        ensemble: ModelEnsemble::new(members),
    })
}

#[test]
fn script_payload_outranks_plain_page_and_classifies_as_xss() {
    init_tracing();
    let attack_url = "https://vulnerable.com/search?q=<script>alert(1)</script>";
    let plain_url = "https://normal-site.com/about-us";

    let extractor = FeatureExtractor::new();
    let attack = extractor.extract(attack_url).features().clone();
    let plain = extractor.extract(plain_url).features().clone();
    assert!(attack.special_char_count > plain.special_char_count);
    assert!(attack.suspicious_keyword_count > plain.suspicious_keyword_count);

    let service = PredictionService::new(bundle());
    let result = service
        .predict(attack_url, None)
        .success()
        .cloned()
        .expect("attack URL must classify");
    assert_eq!(result.predicted_attack_type, "xss");
    assert!(
        result.risk_level == RiskLevel::Critical || result.risk_level == RiskLevel::High,
        "got {}",
        result.risk_level
    );
    assert!(result.confidence > 0.9);
    assert_eq!(result.model_used, "ensemble");
    assert!(result.processing_time_ms >= 0.0);

    let plain_result = service.predict(plain_url, None).success().cloned().unwrap();
    assert_eq!(plain_result.predicted_attack_type, "benign");
    assert_eq!(plain_result.risk_level, RiskLevel::Low);
}

#[test]
fn batch_preserves_order_and_isolates_failures() {
    init_tracing();
    // A classifier whose attack branch references a feature index no input
    // has, so only keyword-bearing URLs hit the broken path.
    let columns: Vec<String> = UrlFeatures::NAMES.iter().map(|n| n.to_string()).collect();
    let dims = columns.len();
    let poisoned = Classifier::RandomForest(ForestModel {
        n_classes: 2,
        trees: vec![DecisionTree {
            root: *split(
                SUSPICIOUS_KEYWORD_COUNT,
                0.5,
                leaf(vec![0.95, 0.05]),
                split(99, 0.0, leaf(vec![0.0, 1.0]), leaf(vec![0.0, 1.0])),
            ),
        }],
    });

    let mut members = BTreeMap::new();
    members.insert(ModelKind::RandomForest, poisoned);
    let bundle = Arc::new(ArtifactBundle {
        version: "1.0.0".to_string(),
        feature_columns: columns,
        attack_types: vec!["benign".into(), "xss".into()],
        scaler: StandardScaler {
            mean: vec![0.0; dims],
            scale: vec![1.0; dims],
        },
        labels: LabelEncoder {
            classes: vec!["benign".into(), "xss".into()],
        },
        ensemble: ModelEnsemble::new(members),
    });

    let service = PredictionService::new(bundle);
    let urls = [
        "https://ok.example/a",
        "https://bad.example/?q=<script>alert(1)</script>",
        "https://fine.example/b",
    ];
    let outcomes = service.batch_predict(urls, None);

    assert_eq!(outcomes.len(), urls.len());
    for (url, outcome) in urls.iter().zip(&outcomes) {
        let recorded = outcome
            .success()
            .map(|r| r.url.as_str())
            .or_else(|| outcome.error().map(|e| e.url.as_str()));
        assert_eq!(recorded, Some(*url));
    }

    assert!(outcomes[0].is_success());
    assert!(!outcomes[1].is_success());
    assert!(outcomes[2].is_success());

    let failure = outcomes[1].error().unwrap();
    assert!(failure.error.contains("inference error"));

    let stats = service.stats();
    assert_eq!(stats.total_predictions, 3);
    assert_eq!(stats.total_errors, 1);
}

#[test]
fn garbage_url_degrades_but_still_classifies() {
    let service = PredictionService::new(bundle());
    let outcome = service.predict("not a url at all", None);

    // Zero features route to the benign leaf rather than failing the call.
    let result = outcome.success().expect("degraded input must classify");
    assert_eq!(result.predicted_attack_type, "benign");
    assert_eq!(result.features["url_length"], 0.0);
    assert_eq!(result.features["entropy"], 0.0);
}

#[test]
fn describe_model_reports_the_bundle() {
    let service = PredictionService::new(bundle());
    let info = service.describe_model();

    assert_eq!(info.version, "1.0.0");
    assert_eq!(
        info.available_models,
        vec!["random_forest", "xgboost", "ensemble"]
    );
    assert_eq!(info.feature_columns.len(), UrlFeatures::NAMES.len());
    assert_eq!(info.attack_types, vec!["benign", "sqli", "xss"]);
}

#[test]
fn member_and_ensemble_predictions_disagree_on_confidence_only() {
    let service = PredictionService::new(bundle());
    let url = "https://vulnerable.com/search?q=<script>alert(1)</script>";

    let forest = service.predict(url, Some("random_forest")).success().cloned().unwrap();
    let voted = service.predict(url, Some("ensemble")).success().cloned().unwrap();

    assert_eq!(forest.predicted_attack_type, voted.predicted_attack_type);
    assert_eq!(forest.model_used, "random_forest");
    assert_eq!(voted.model_used, "ensemble");
    assert!((forest.confidence - 0.95).abs() < 1e-12);
    assert!(voted.confidence < forest.confidence);
}

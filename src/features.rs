//! URL Feature Extraction
//!
//! Turns a raw URL string into the fixed set of numeric features the
//! classifiers were trained on. Extraction is total and deterministic: a
//! URL that cannot be decomposed degrades to an all-zero feature set
//! instead of failing the request.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use url::{Position, Url};

/// Characters counted by `special_char_count`.
const SPECIAL_CHARS: [char; 30] = [
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+', '-', '=', '[', ']', '{', '}', ';',
    '\'', ':', '"', '\\', '|', ',', '.', '<', '>', '/', '?',
];

/// Common benign URL substrings; each occurrence adds 0.1 to the frequency
/// score, which is clamped to [0.0, 1.0].
const COMMON_PATTERNS: [&str; 6] = [".com", ".org", ".net", "www.", "http", "https"];

/// Keywords counted once each when present anywhere in the lower-cased URL.
const SUSPICIOUS_KEYWORDS: [&str; 29] = [
    "admin",
    "root",
    "password",
    "passwd",
    "login",
    "cmd",
    "shell",
    "union",
    "select",
    "insert",
    "delete",
    "drop",
    "exec",
    "script",
    "alert",
    "prompt",
    "confirm",
    "javascript",
    "vbscript",
    "../",
    "..\\",
    "/etc/",
    "/proc/",
    "/var/",
    "|",
    "&",
    ";",
    "`",
    "$(",
];

/// Named feature set for a single URL.
///
/// Field values are always finite and non-negative; `frequency_score` is
/// additionally clamped to [0.0, 1.0].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlFeatures {
    /// Character count of the whole URL.
    pub url_length: f64,
    /// Character count of the authority component (userinfo, host, port).
    pub domain_length: f64,
    /// Character count of the path component.
    pub path_length: f64,
    /// Character count of the query component.
    pub query_length: f64,
    /// Count of punctuation/metacharacters anywhere in the URL.
    pub special_char_count: f64,
    /// Count of ASCII digits anywhere in the URL.
    pub digit_count: f64,
    /// Shannon entropy (bits) of the URL's character distribution.
    pub entropy: f64,
    /// Number of non-empty path segments.
    pub path_depth: f64,
    /// Dot-separated host labels beyond registrable domain + TLD.
    pub subdomain_count: f64,
    /// Number of distinct query-parameter names.
    pub parameter_count: f64,
    /// Number of percent-encoded escape sequences.
    pub encoded_chars_count: f64,
    /// Occurrence-weighted score of common benign substrings.
    pub frequency_score: f64,
    /// Number of distinct suspicious keywords present.
    pub suspicious_keyword_count: f64,
}

impl UrlFeatures {
    /// Names of every feature the extractor produces, in training order.
    pub const NAMES: [&'static str; 13] = [
        "url_length",
        "domain_length",
        "path_length",
        "query_length",
        "special_char_count",
        "digit_count",
        "entropy",
        "path_depth",
        "subdomain_count",
        "parameter_count",
        "encoded_chars_count",
        "frequency_score",
        "suspicious_keyword_count",
    ];

    /// Look up a feature by its column name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "url_length" => Some(self.url_length),
            "domain_length" => Some(self.domain_length),
            "path_length" => Some(self.path_length),
            "query_length" => Some(self.query_length),
            "special_char_count" => Some(self.special_char_count),
            "digit_count" => Some(self.digit_count),
            "entropy" => Some(self.entropy),
            "path_depth" => Some(self.path_depth),
            "subdomain_count" => Some(self.subdomain_count),
            "parameter_count" => Some(self.parameter_count),
            "encoded_chars_count" => Some(self.encoded_chars_count),
            "frequency_score" => Some(self.frequency_score),
            "suspicious_keyword_count" => Some(self.suspicious_keyword_count),
            _ => None,
        }
    }

    /// Name → value mapping for result payloads.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get(name).map(|value| (name.to_string(), value)))
            .collect()
    }
}

/// Whether `name` names a feature the extractor produces.
pub fn is_known_feature(name: &str) -> bool {
    UrlFeatures::NAMES.contains(&name)
}

/// Outcome of feature extraction.
///
/// Both variants carry a complete feature set; `Degraded` marks a URL whose
/// decomposition failed and whose features were therefore zero-filled, so
/// the two cases stay distinguishable in logs and tests even though both
/// continue through the prediction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureExtraction {
    /// Features computed from a decomposable URL.
    Extracted(UrlFeatures),
    /// URL decomposition failed; every feature defaulted to zero.
    Degraded(UrlFeatures),
}

impl FeatureExtraction {
    /// The feature set, regardless of degradation.
    pub fn features(&self) -> &UrlFeatures {
        match self {
            Self::Extracted(features) | Self::Degraded(features) => features,
        }
    }

    /// Whether this extraction fell back to the zero vector.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Stateless URL feature extractor.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract the full feature set from `url`.
    ///
    /// Never fails: URLs that cannot be decomposed yield
    /// [`FeatureExtraction::Degraded`] with an all-zero feature set.
    pub fn extract(&self, url: &str) -> FeatureExtraction {
        match decompose(url) {
            Ok(features) => FeatureExtraction::Extracted(features),
            Err(error) => {
                tracing::warn!(url, error = %error, "URL decomposition failed, degrading to zero features");
                FeatureExtraction::Degraded(UrlFeatures::default())
            }
        }
    }
}

fn decompose(url: &str) -> Result<UrlFeatures, url::ParseError> {
    let parsed = Url::parse(url)?;
    let authority = &parsed[Position::BeforeUsername..Position::AfterPort];
    let path = parsed.path();
    let query = parsed.query().unwrap_or("");

    let lower = url.to_lowercase();
    let host_labels = parsed
        .host_str()
        .map(|host| host.split('.').count())
        .unwrap_or(0);
    let parameter_names: HashSet<_> = parsed.query_pairs().map(|(name, _)| name).collect();

    Ok(UrlFeatures {
        url_length: url.chars().count() as f64,
        domain_length: authority.chars().count() as f64,
        path_length: path.chars().count() as f64,
        query_length: query.chars().count() as f64,
        special_char_count: url.chars().filter(|c| SPECIAL_CHARS.contains(c)).count() as f64,
        digit_count: url.chars().filter(char::is_ascii_digit).count() as f64,
        entropy: shannon_entropy(url),
        path_depth: path.split('/').filter(|segment| !segment.is_empty()).count() as f64,
        subdomain_count: host_labels.saturating_sub(2) as f64,
        parameter_count: parameter_names.len() as f64,
        encoded_chars_count: count_percent_escapes(url) as f64,
        frequency_score: frequency_score(&lower),
        suspicious_keyword_count: SUSPICIOUS_KEYWORDS
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .count() as f64,
    })
}

/// Shannon entropy, in bits, of the character distribution of `text`.
fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }

    let total = text.chars().count() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Count `%XX` escape sequences (a percent sign followed by two hex digits).
fn count_percent_escapes(url: &str) -> usize {
    let bytes = url.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| {
            b == b'%'
                && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit)
        })
        .count()
}

fn frequency_score(lower: &str) -> f64 {
    let mut score = 0.0;
    for pattern in COMMON_PATTERNS {
        score += 0.1 * lower.matches(pattern).count() as f64;
    }
    score.clamp(0.0, 1.0)
}

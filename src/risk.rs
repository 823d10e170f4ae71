//! Confidence-to-Risk Policy
//!
//! Pure mapping from (attack type, confidence) to a coarse triage category.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Attack types that escalate the risk ladder.
const HIGH_RISK_ATTACKS: [&str; 5] = ["sqli", "xss", "command_injection", "web_shell", "xxe"];

/// Coarse triage category for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Benign traffic or low-confidence, low-impact attacks.
    Low,
    /// Worth a look, not urgent.
    Medium,
    /// Likely attack, prioritize.
    High,
    /// High-confidence, high-impact attack.
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Map a predicted attack type and its confidence to a risk level.
///
/// `benign` is always low. High-impact attack types step through
/// critical/high/medium on the 0.9 and 0.7 confidence thresholds; every
/// other attack type steps through high/medium/low on the same thresholds.
pub fn classify(attack_type: &str, confidence: f64) -> RiskLevel {
    if attack_type == "benign" {
        return RiskLevel::Low;
    }

    if HIGH_RISK_ATTACKS.contains(&attack_type) {
        if confidence >= 0.9 {
            RiskLevel::Critical
        } else if confidence >= 0.7 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    } else if confidence >= 0.9 {
        RiskLevel::High
    } else if confidence >= 0.7 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

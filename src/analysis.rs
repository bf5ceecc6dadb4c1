//! analysis.rs - output types for crisis evaluation: severity tiers,
//! escalation classification and the full analysis payload returned to the
//! caller. Pure data; scoring logic lives in `scorer.rs`.

use serde::{Deserialize, Serialize};

/// Ordinal severity tier. The derive order matters: `Low < Medium < High <
/// Critical`, so gate rules can compare tiers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map an escalation score (0-100) to a tier.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Severity::Critical
        } else if score >= 60.0 {
            Severity::High
        } else if score >= 35.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Escalation pattern relative to the user's recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    None,
    SuddenSpike,
    Gradual,
    Both,
}

/// Baseline sentiment label recomputed after every analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Where the analyzed text came from. `Other` catches future surfaces
/// without a wire-format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Chat,
    MoodLog,
    Journal,
    Checkin,
    #[serde(other)]
    Other,
}

impl TextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextSource::Chat => "chat",
            TextSource::MoodLog => "mood_log",
            TextSource::Journal => "journal",
            TextSource::Checkin => "checkin",
            TextSource::Other => "other",
        }
    }
}

/// Full result of one crisis-analysis call. This is the shape the HTTP layer
/// serializes back to the client, and what tests assert against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisAnalysis {
    pub is_crisis: bool,
    pub severity: Severity,
    /// 0-100 escalation score for this single text.
    pub escalation_score: f64,
    pub escalation_type: EscalationType,
    pub detected_keywords: Vec<String>,
    pub personal_triggers_detected: Vec<String>,
    /// Natural-language description of how this compares to the user's norm.
    pub comparison_to_baseline: String,
    pub should_trigger_popup: bool,
    pub popup_urgency: Severity,
    /// Oracle free-text analysis, or the rule-based substitute.
    pub ai_analysis: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
}

/// Result of the stateless quick keyword scan (no profile, no oracle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisDetection {
    pub is_crisis: bool,
    pub severity: Severity,
    pub detected_keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
}

pub(crate) fn clamp_score(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_from_score_thresholds() {
        assert_eq!(Severity::from_score(0.0), Severity::Low);
        assert_eq!(Severity::from_score(34.9), Severity::Low);
        assert_eq!(Severity::from_score(35.0), Severity::Medium);
        assert_eq!(Severity::from_score(60.0), Severity::High);
        assert_eq!(Severity::from_score(80.0), Severity::Critical);
        assert_eq!(Severity::from_score(100.0), Severity::Critical);
    }

    #[test]
    fn serialize_wire_shape() {
        let a = CrisisAnalysis {
            is_crisis: true,
            severity: Severity::High,
            escalation_score: 65.0,
            escalation_type: EscalationType::SuddenSpike,
            detected_keywords: vec!["hopeless".into()],
            personal_triggers_detected: vec![],
            comparison_to_baseline: "Above typical baseline".into(),
            should_trigger_popup: true,
            popup_urgency: Severity::High,
            ai_analysis: "Rule-based detection".into(),
            recommended_actions: vec!["Reach out to trusted person".into()],
            follow_up_question: None,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["severity"], serde_json::json!("high"));
        assert_eq!(v["escalation_type"], serde_json::json!("sudden_spike"));
        assert!(v.get("follow_up_question").is_none());
    }

    #[test]
    fn source_round_trips_snake_case() {
        let s: TextSource = serde_json::from_str("\"mood_log\"").unwrap();
        assert_eq!(s, TextSource::MoodLog);
        // Unknown surfaces degrade to Other instead of erroring.
        let s: TextSource = serde_json::from_str("\"voice_note\"").unwrap();
        assert_eq!(s, TextSource::Other);
    }
}

//! # Crisis Scorer
//! Pure, testable logic that maps `(oracle assessment | rule fallback,
//! keyword matches, recent history average)` → `CrisisAnalysis`.
//! No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: the oracle is advisory. When it is unavailable the deterministic
//! fallback below produces the same field shape, so downstream code never
//! branches on where the assessment came from.

use crate::analysis::{clamp_score, CrisisAnalysis, EscalationType, Severity};
use crate::oracle::OracleAssessment;

/// Escalation score added per fixed-lexicon match in the fallback path.
const KEYWORD_WEIGHT: f64 = 15.0;
/// Personal triggers weigh heavier: they are learned, user-specific signals.
const TRIGGER_WEIGHT: f64 = 20.0;

const FOLLOW_UP_QUESTION: &str = "How are you feeling right now? I'm here to support you.";

/// Deterministic substitute when the oracle call fails, times out or returns
/// unparsable output. Must behave identically with or without network access.
pub fn fallback_assessment(
    detected_keywords: &[String],
    personal_triggers: &[String],
) -> OracleAssessment {
    let kw = detected_keywords.len();
    let trig = personal_triggers.len();
    let matches = kw + trig;

    let urgency = if kw >= 3 {
        Severity::High
    } else if kw > 0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    OracleAssessment {
        crisis_score: clamp_score(kw as f64 * KEYWORD_WEIGHT + trig as f64 * TRIGGER_WEIGHT),
        emotional_intensity: (matches + 3).min(10) as u8,
        escalation_assessment: Some(if kw >= 2 { "sudden_spike" } else { "none" }.to_string()),
        detected_emotions: if kw > 0 {
            vec!["distress".to_string()]
        } else {
            vec![]
        },
        comparison_to_baseline: Some("Unable to analyze - using rule-based detection".to_string()),
        trigger_popup: kw >= 2 || trig >= 1,
        urgency_level: urgency,
        analysis: format!(
            "Rule-based detection: found {kw} crisis keywords and {trig} personal triggers."
        ),
        recommended_actions: vec![
            "Contact emergency services if in immediate danger".to_string(),
            "Reach out to a trusted person".to_string(),
            "Use your coping strategies".to_string(),
        ],
        new_personal_triggers: vec![],
        coping_strategy_suggestions: vec![
            "Deep breathing".to_string(),
            "Grounding exercise".to_string(),
            "Call a crisis hotline".to_string(),
        ],
    }
}

/// Classify the escalation pattern by comparing the current score with the
/// average over the recent ledger window.
pub fn classify_escalation(crisis_score: f64, avg_recent_score: f64) -> EscalationType {
    if crisis_score > 70.0 {
        if avg_recent_score < 30.0 {
            EscalationType::SuddenSpike
        } else if avg_recent_score > 40.0 {
            EscalationType::Gradual
        } else {
            EscalationType::Both
        }
    } else if crisis_score > 50.0 && avg_recent_score > 35.0 {
        EscalationType::Gradual
    } else if crisis_score > 60.0 {
        EscalationType::SuddenSpike
    } else {
        EscalationType::None
    }
}

/// Assemble the caller-facing analysis from an assessment (oracle or
/// fallback) plus the lexical matches and history average.
pub fn build_analysis(
    assessment: &OracleAssessment,
    detected_keywords: Vec<String>,
    personal_triggers_detected: Vec<String>,
    avg_recent_score: f64,
) -> CrisisAnalysis {
    let score = clamp_score(assessment.crisis_score);
    let severity = Severity::from_score(score);
    let should_trigger_popup = assessment.trigger_popup || score >= 60.0;

    CrisisAnalysis {
        is_crisis: score >= 35.0,
        severity,
        escalation_score: score,
        escalation_type: classify_escalation(score, avg_recent_score),
        detected_keywords,
        personal_triggers_detected,
        comparison_to_baseline: assessment
            .comparison_to_baseline
            .clone()
            .unwrap_or_else(|| "No baseline comparison available".to_string()),
        should_trigger_popup,
        popup_urgency: assessment.urgency_level,
        ai_analysis: assessment.analysis.clone(),
        recommended_actions: assessment.recommended_actions.clone(),
        // A gentle check-in only when we are not already interrupting the
        // user with the safety popup.
        follow_up_question: if should_trigger_popup {
            None
        } else {
            Some(FOLLOW_UP_QUESTION.to_string())
        },
    }
}

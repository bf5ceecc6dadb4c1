//! # Authority-Alert Gatekeeper
//!
//! Ultra-conservative decision logic for notifying a real external
//! authority. False positives waste emergency resources and erode trust, so
//! the rules are evaluated in order and the first failing rule
//! short-circuits with its reason:
//!
//! 1. Severity floor - only `critical` proceeds.
//! 2. Cooldown - at most one sent alert per user per rolling 4-hour window.
//! 3. Explicit-threat confirmation - an imminent-action phrase, or a
//!    sustained pattern (≥2 critical ledger entries in 24h).
//! 4. Novelty - the context must not be a near-repeat of the last alerted
//!    text; similarity and cooldown are independent checks, most
//!    restrictive wins.
//!
//! Pure decision over snapshots; the caller does the reads, the
//! notification and the logging. On any internal error the caller must fail
//! closed (never alert).

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::analysis::Severity;
use crate::lexicon;
use crate::profile::UserLearningProfile;
use crate::store::CrisisAlertRecord;

pub const DEFAULT_POLICY_CONFIG_PATH: &str = "config/policy.toml";
pub const ENV_POLICY_CONFIG_PATH: &str = "ALERT_POLICY_CONFIG_PATH";

/// Policy constants. The defaults mirror the shipped behavior exactly; they
/// are configuration, not tunable at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertPolicy {
    /// Minimum minutes between two sent alerts for the same user.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    /// Window for the sustained-pattern check.
    #[serde(default = "default_critical_window_hours")]
    pub critical_window_hours: i64,
    /// Critical ledger entries required inside the window when no explicit
    /// phrase matched.
    #[serde(default = "default_min_critical_incidents")]
    pub min_critical_incidents: usize,
    /// Word-overlap ratio above which a context counts as a repeat.
    #[serde(default = "default_max_context_overlap")]
    pub max_context_overlap: f64,
}

fn default_cooldown_minutes() -> i64 {
    240
}
fn default_critical_window_hours() -> i64 {
    24
}
fn default_min_critical_incidents() -> usize {
    2
}
fn default_max_context_overlap() -> f64 {
    0.7
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            critical_window_hours: default_critical_window_hours(),
            min_critical_incidents: default_min_critical_incidents(),
            max_context_overlap: default_max_context_overlap(),
        }
    }
}

impl AlertPolicy {
    /// Load from a TOML file; built-in defaults on any read/parse failure.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Path from `ALERT_POLICY_CONFIG_PATH` or the default location.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_POLICY_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_POLICY_CONFIG_PATH.to_string());
        Self::load_from_file(path)
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub alert: bool,
    pub reason: String,
}

impl GateDecision {
    fn block(reason: impl Into<String>) -> Self {
        Self {
            alert: false,
            reason: reason.into(),
        }
    }

    fn pass(reason: impl Into<String>) -> Self {
        Self {
            alert: true,
            reason: reason.into(),
        }
    }
}

/// Snapshot of the persisted state the gate needs. The caller reads it under
/// a consistent view; the gate never performs I/O.
pub struct GateInput<'a> {
    pub severity: Severity,
    pub crisis_context: &'a str,
    /// Most recent alert with `email_sent=true` for this user, any age.
    pub last_sent_alert: Option<&'a CrisisAlertRecord>,
    pub profile: Option<&'a UserLearningProfile>,
    pub now: chrono::DateTime<chrono::Utc>,
}

pub fn evaluate(policy: &AlertPolicy, input: &GateInput<'_>) -> GateDecision {
    // RULE 1: severity floor. Everything below critical gets in-app popup
    // support but never an authority alert.
    if input.severity != Severity::Critical {
        return GateDecision::block(format!(
            "severity '{}' below critical threshold - popup support sufficient",
            input.severity.as_str()
        ));
    }

    // RULE 2: hard cooldown against the last sent alert. No override.
    if let Some(last) = input.last_sent_alert {
        let minutes_since = (input.now - last.timestamp).num_minutes();
        if minutes_since < policy.cooldown_minutes {
            return GateDecision::block(format!(
                "authority alerted {minutes_since} min ago - cooldown period ({} min minimum)",
                policy.cooldown_minutes
            ));
        }
    }

    // RULE 3: even for critical severity, require either an explicit
    // imminent-action phrase or a sustained critical pattern in the ledger.
    let has_explicit_threat = lexicon::has_explicit_imminent_threat(input.crisis_context);
    if !has_explicit_threat {
        let cutoff = input.now - chrono::Duration::hours(policy.critical_window_hours);
        let recent_critical = input
            .profile
            .map(|p| p.critical_since(cutoff))
            .unwrap_or(0);
        if recent_critical < policy.min_critical_incidents {
            return GateDecision::block(
                "critical severity but no explicit imminent threat - requires sustained \
                 pattern or explicit phrase for authority alert",
            );
        }
    }

    // RULE 4: novelty. Repeat text must not re-trigger a dispatch, even if
    // the cooldown has separately expired.
    if let Some(last) = input.last_sent_alert {
        let overlap = word_overlap_ratio(input.crisis_context, &last.crisis_context);
        if overlap > policy.max_context_overlap {
            return GateDecision::block(
                "crisis text too similar to recent alert - likely repeat, not escalating",
            );
        }
    }

    if has_explicit_threat {
        GateDecision::pass("critical severity + explicit imminent threat detected")
    } else {
        GateDecision::pass("critical severity + sustained critical pattern confirmed")
    }
}

/// |current ∩ previous| / |current| over lowercased whitespace word sets.
/// 0.0 when the current context has no words.
fn word_overlap_ratio(current: &str, previous: &str) -> f64 {
    let cur: HashSet<String> = current.to_lowercase().split_whitespace().map(str::to_string).collect();
    if cur.is_empty() {
        return 0.0;
    }
    let prev: HashSet<String> =
        previous.to_lowercase().split_whitespace().map(str::to_string).collect();
    cur.intersection(&prev).count() as f64 / cur.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TextSource;
    use crate::profile::AnalysisOutcome;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn sent_alert(context: &str, at: chrono::DateTime<chrono::Utc>) -> CrisisAlertRecord {
        CrisisAlertRecord {
            alert_id: Uuid::new_v4(),
            user_id: "u1".into(),
            severity: Severity::Critical,
            crisis_context: context.into(),
            ai_message: "msg".into(),
            email_sent: true,
            delivered: true,
            decision_reason: "test".into(),
            timestamp: at,
            user_consent: true,
        }
    }

    fn profile_with_criticals(n: usize, now: chrono::DateTime<chrono::Utc>) -> UserLearningProfile {
        let mut p = UserLearningProfile::new("u1", now);
        for _ in 0..n {
            p.record_analysis(
                &AnalysisOutcome {
                    text: "episode".into(),
                    source: TextSource::Chat,
                    severity: Severity::Critical,
                    escalation_score: 90.0,
                    detected_keywords: vec![],
                    personal_triggers_detected: vec![],
                    new_personal_triggers: vec![],
                    coping_strategy_suggestions: vec![],
                },
                now - Duration::hours(1),
            );
        }
        p
    }

    #[test]
    fn below_critical_never_alerts() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let profile = profile_with_criticals(5, now);
        for severity in [Severity::Low, Severity::Medium, Severity::High] {
            let d = evaluate(
                &policy,
                &GateInput {
                    severity,
                    crisis_context: "I am going to kill myself tonight",
                    last_sent_alert: None,
                    profile: Some(&profile),
                    now,
                },
            );
            assert!(!d.alert);
            assert!(d.reason.contains("below critical threshold"), "{}", d.reason);
        }
    }

    #[test]
    fn cooldown_blocks_second_alert() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let last = sent_alert("earlier unrelated context entirely", now - Duration::minutes(239));
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: "I am going to jump off the bridge right now",
                last_sent_alert: Some(&last),
                profile: None,
                now,
            },
        );
        assert!(!d.alert);
        assert!(d.reason.contains("cooldown"), "{}", d.reason);
    }

    #[test]
    fn explicit_threat_passes_without_history() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: "I am about to jump",
                last_sent_alert: None,
                profile: None,
                now,
            },
        );
        assert!(d.alert);
        assert!(d.reason.contains("explicit imminent threat"));
    }

    #[test]
    fn no_explicit_threat_requires_sustained_pattern() {
        let policy = AlertPolicy::default();
        let now = Utc::now();

        let one = profile_with_criticals(1, now);
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: "everything is dark and heavy",
                last_sent_alert: None,
                profile: Some(&one),
                now,
            },
        );
        assert!(!d.alert);
        assert!(d.reason.contains("sustained"), "{}", d.reason);

        let two = profile_with_criticals(2, now);
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: "everything is dark and heavy",
                last_sent_alert: None,
                profile: Some(&two),
                now,
            },
        );
        assert!(d.alert);
        assert!(d.reason.contains("sustained critical pattern"));
    }

    #[test]
    fn old_criticals_outside_window_do_not_count() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        for _ in 0..3 {
            p.record_analysis(
                &AnalysisOutcome {
                    text: "old episode".into(),
                    source: TextSource::Chat,
                    severity: Severity::Critical,
                    escalation_score: 90.0,
                    detected_keywords: vec![],
                    personal_triggers_detected: vec![],
                    new_personal_triggers: vec![],
                    coping_strategy_suggestions: vec![],
                },
                now - Duration::hours(30),
            );
        }
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: "everything is dark and heavy",
                last_sent_alert: None,
                profile: Some(&p),
                now,
            },
        );
        assert!(!d.alert);
    }

    #[test]
    fn repeat_text_blocked_even_after_cooldown() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let context = "I am going to jump off the bridge";
        // Cooldown long expired; similarity still blocks.
        let last = sent_alert(context, now - Duration::hours(10));
        let d = evaluate(
            &policy,
            &GateInput {
                severity: Severity::Critical,
                crisis_context: context,
                last_sent_alert: Some(&last),
                profile: None,
                now,
            },
        );
        assert!(!d.alert);
        assert!(d.reason.contains("too similar"), "{}", d.reason);
    }

    #[test]
    fn overlap_ratio_is_relative_to_current_words() {
        assert_eq!(word_overlap_ratio("", "whatever"), 0.0);
        assert!((word_overlap_ratio("a b c d", "a b") - 0.5).abs() < 1e-9);
        assert_eq!(word_overlap_ratio("a a a", "a"), 1.0);
    }

    #[test]
    fn policy_defaults_preserved() {
        let p = AlertPolicy::default();
        assert_eq!(p.cooldown_minutes, 240);
        assert_eq!(p.critical_window_hours, 24);
        assert_eq!(p.min_critical_incidents, 2);
        assert!((p.max_context_overlap - 0.7).abs() < 1e-9);
    }

    #[test]
    fn policy_file_missing_falls_back_to_defaults() {
        let p = AlertPolicy::load_from_file("/nonexistent/policy.toml");
        assert_eq!(p.cooldown_minutes, 240);
    }
}

//! profile.rs - per-user learning profile: emotional baseline (EWMA mood
//! score), bounded escalation ledger, personal triggers and coping
//! strategies.
//!
//! All caps are enforced at insert time (insert + trim), never as a post-hoc
//! cleanup pass. The EWMA update in `record_analysis` is the only mutator of
//! `average_mood_score`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Sentiment, Severity, TextSource};

/// Escalation ledger keeps only the most recent entries.
pub const HISTORY_CAP: usize = 50;
/// How many recent ledger entries feed the trend comparison.
pub const RECENT_WINDOW: usize = 10;
pub const TRIGGER_CAP: usize = 20;
pub const COPING_CAP: usize = 15;
pub const TYPICAL_KEYWORD_CAP: usize = 30;
/// Persisted text samples are truncated; full text is never retained.
pub const TEXT_SAMPLE_CAP: usize = 200;

const EWMA_KEEP: f64 = 0.9;
const EWMA_BLEND: f64 = 0.1;

/// One immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// 0-100 escalation score at the time of the analysis.
    pub escalation_score: f64,
    /// First 200 chars of the analyzed text (privacy bound).
    pub text_sample: String,
    pub source: TextSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalBaseline {
    /// 0-10 moving average; 10 is a good day.
    pub average_mood_score: f64,
    pub typical_keywords: Vec<String>,
    pub baseline_sentiment: Sentiment,
    pub last_updated: DateTime<Utc>,
}

impl EmotionalBaseline {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            average_mood_score: 5.0,
            typical_keywords: Vec::new(),
            baseline_sentiment: Sentiment::Neutral,
            last_updated: now,
        }
    }
}

/// Per-user learning profile. Created lazily on first analysis, mutated on
/// every analysis call, never deleted in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLearningProfile {
    pub id: Uuid,
    pub user_id: String,
    pub emotional_baseline: EmotionalBaseline,
    pub personal_crisis_triggers: Vec<String>,
    pub escalation_history: Vec<EscalationRecord>,
    pub effective_coping_strategies: Vec<String>,
    pub total_interactions: u64,
    pub high_risk_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_high_risk: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserLearningProfile {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            emotional_baseline: EmotionalBaseline::new(now),
            personal_crisis_triggers: Vec::new(),
            escalation_history: Vec::new(),
            effective_coping_strategies: Vec::new(),
            total_interactions: 0,
            high_risk_count: 0,
            last_high_risk: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Arithmetic mean of the last `RECENT_WINDOW` ledger scores; 0 if the
    /// ledger is empty.
    pub fn recent_average_score(&self) -> f64 {
        let n = self.escalation_history.len();
        if n == 0 {
            return 0.0;
        }
        let start = n.saturating_sub(RECENT_WINDOW);
        let window = &self.escalation_history[start..];
        window.iter().map(|r| r.escalation_score).sum::<f64>() / window.len() as f64
    }

    /// Critical ledger entries newer than `cutoff`.
    pub fn critical_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.escalation_history
            .iter()
            .filter(|r| r.severity == Severity::Critical && r.timestamp >= cutoff)
            .count()
    }

    /// Apply all learning side effects of one analysis in a single step, so
    /// a persisted profile is always internally consistent (ledger, counters
    /// and baseline move together).
    pub fn record_analysis(&mut self, outcome: &AnalysisOutcome, now: DateTime<Utc>) {
        // Ledger: insert + trim to cap, oldest evicted, order preserved.
        self.escalation_history.push(EscalationRecord {
            timestamp: now,
            severity: outcome.severity,
            escalation_score: outcome.escalation_score,
            text_sample: truncate_sample(&outcome.text),
            source: outcome.source,
        });
        if self.escalation_history.len() > HISTORY_CAP {
            let excess = self.escalation_history.len() - HISTORY_CAP;
            self.escalation_history.drain(0..excess);
        }

        merge_capped(
            &mut self.personal_crisis_triggers,
            &outcome.new_personal_triggers,
            TRIGGER_CAP,
        );
        merge_capped(
            &mut self.effective_coping_strategies,
            &outcome.coping_strategy_suggestions,
            COPING_CAP,
        );

        self.total_interactions += 1;
        if outcome.severity >= Severity::High {
            self.high_risk_count += 1;
            self.last_high_risk = Some(now);
        }

        // EWMA toward the mood equivalent of this score; stays in [0, 10]
        // for any score in [0, 100].
        let mood = 10.0 - outcome.escalation_score / 10.0;
        let b = &mut self.emotional_baseline;
        b.average_mood_score =
            (b.average_mood_score * EWMA_KEEP + mood * EWMA_BLEND).clamp(0.0, 10.0);
        b.baseline_sentiment = if outcome.escalation_score >= 50.0 {
            Sentiment::Negative
        } else if outcome.escalation_score <= 20.0 {
            Sentiment::Positive
        } else {
            Sentiment::Neutral
        };
        let observed: Vec<String> = outcome
            .detected_keywords
            .iter()
            .chain(outcome.personal_triggers_detected.iter())
            .cloned()
            .collect();
        merge_capped(&mut b.typical_keywords, &observed, TYPICAL_KEYWORD_CAP);
        b.last_updated = now;

        self.updated_at = now;
    }
}

/// Inputs `record_analysis` needs from the scorer, bundled so the update is
/// applied atomically per analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub text: String,
    pub source: TextSource,
    pub severity: Severity,
    pub escalation_score: f64,
    pub detected_keywords: Vec<String>,
    pub personal_triggers_detected: Vec<String>,
    pub new_personal_triggers: Vec<String>,
    pub coping_strategy_suggestions: Vec<String>,
}

/// Append unseen entries (dedup, case-preserving) then trim to `cap`.
/// Existing entries keep their position; the cap never grows the list.
fn merge_capped(existing: &mut Vec<String>, incoming: &[String], cap: usize) {
    for item in incoming {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if !existing.iter().any(|e| e.eq_ignore_ascii_case(item)) {
            existing.push(item.to_string());
        }
    }
    existing.truncate(cap);
}

/// Char-safe truncation to `TEXT_SAMPLE_CAP` characters.
pub fn truncate_sample(text: &str) -> String {
    text.chars().take(TEXT_SAMPLE_CAP).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn outcome(score: f64) -> AnalysisOutcome {
        AnalysisOutcome {
            text: "sample".into(),
            source: TextSource::MoodLog,
            severity: Severity::from_score(score),
            escalation_score: score,
            detected_keywords: vec![],
            personal_triggers_detected: vec![],
            new_personal_triggers: vec![],
            coping_strategy_suggestions: vec![],
        }
    }

    #[test]
    fn ledger_capped_at_fifty_in_order() {
        let t0 = Utc::now();
        let mut p = UserLearningProfile::new("u1", t0);
        for i in 0..60 {
            p.record_analysis(&outcome(10.0 + i as f64 / 10.0), t0 + Duration::minutes(i));
        }
        assert_eq!(p.escalation_history.len(), HISTORY_CAP);
        // Oldest evicted: first surviving record is analysis #10.
        assert!((p.escalation_history[0].escalation_score - 11.0).abs() < 1e-9);
        assert!(p
            .escalation_history
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(p.total_interactions, 60);
    }

    #[test]
    fn ewma_stays_in_bounds() {
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        for score in [0.0, 100.0, 100.0, 100.0, 0.0, 55.5, 100.0] {
            p.record_analysis(&outcome(score), now);
            let m = p.emotional_baseline.average_mood_score;
            assert!((0.0..=10.0).contains(&m), "mood {m} out of range");
        }
    }

    #[test]
    fn high_risk_counter_never_decrements() {
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        p.record_analysis(&outcome(85.0), now); // critical
        assert_eq!(p.high_risk_count, 1);
        assert!(p.last_high_risk.is_some());
        p.record_analysis(&outcome(5.0), now); // calm entry, counter keeps
        assert_eq!(p.high_risk_count, 1);
    }

    #[test]
    fn recent_average_uses_last_ten() {
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        assert_eq!(p.recent_average_score(), 0.0);
        for _ in 0..5 {
            p.record_analysis(&outcome(90.0), now);
        }
        for _ in 0..10 {
            p.record_analysis(&outcome(20.0), now);
        }
        // Only the ten most recent (all 20.0) are in the window.
        assert!((p.recent_average_score() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn trigger_merge_dedups_and_caps() {
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        let mut o = outcome(40.0);
        o.new_personal_triggers = (0..25).map(|i| format!("trigger-{i}")).collect();
        o.new_personal_triggers.push("Trigger-0".into()); // dup, case-insensitive
        p.record_analysis(&o, now);
        assert_eq!(p.personal_crisis_triggers.len(), TRIGGER_CAP);
        assert_eq!(p.personal_crisis_triggers[0], "trigger-0");
    }

    #[test]
    fn sample_truncated_to_privacy_bound() {
        let long = "x".repeat(500);
        assert_eq!(truncate_sample(&long).len(), TEXT_SAMPLE_CAP);
    }

    #[test]
    fn sentiment_thresholds() {
        let now = Utc::now();
        let mut p = UserLearningProfile::new("u1", now);
        p.record_analysis(&outcome(55.0), now);
        assert_eq!(p.emotional_baseline.baseline_sentiment, Sentiment::Negative);
        p.record_analysis(&outcome(10.0), now);
        assert_eq!(p.emotional_baseline.baseline_sentiment, Sentiment::Positive);
        p.record_analysis(&outcome(30.0), now);
        assert_eq!(p.emotional_baseline.baseline_sentiment, Sentiment::Neutral);
    }
}

// tests/engine_e2e.rs
//
// End-to-end engine tests over in-memory stores and mock oracles:
// rule fallback when the oracle dies, trigger learning from oracle output,
// the authority-alert gate under cooldown, and the fail-closed path when
// the alert log cannot be written.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use mindhaven_engine::analysis::{Severity, TextSource};
use mindhaven_engine::engine::CrisisEngine;
use mindhaven_engine::gatekeeper::AlertPolicy;
use mindhaven_engine::notify::NotifierMux;
use mindhaven_engine::oracle::{MockOracle, OracleAssessment};
use mindhaven_engine::profile::UserLearningProfile;
use mindhaven_engine::store::{AlertLogStore, CrisisAlertRecord, MemoryStore, ProfileStore};

fn engine_with_oracle(oracle: MockOracle) -> CrisisEngine {
    let store = Arc::new(MemoryStore::new());
    CrisisEngine::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(oracle),
        NotifierMux::new(vec![]),
        AlertPolicy::default(),
    )
}

fn assessment(v: serde_json::Value) -> OracleAssessment {
    serde_json::from_value(v).expect("valid assessment json")
}

#[tokio::test]
async fn dead_oracle_falls_back_to_rules_and_learns() {
    let engine = engine_with_oracle(MockOracle::failing());

    // Two keywords: 2 * 15 = 30, popup threshold met via keyword count.
    let a = engine
        .analyze_text("u1", "I feel hopeless and worthless", TextSource::Chat, None)
        .await
        .expect("analyze");
    assert_eq!(a.escalation_score, 30.0);
    assert!(a.should_trigger_popup);
    assert!(!a.is_crisis, "30 is below the crisis floor");

    let p = engine.learning_profile("u1").await.expect("profile");
    assert_eq!(p.total_interactions, 1);
    assert_eq!(p.escalation_history.len(), 1);
    assert_eq!(p.escalation_history[0].escalation_score, 30.0);
}

#[tokio::test]
async fn oracle_judgment_drives_severity_and_popup() {
    let engine = engine_with_oracle(MockOracle::with_assessment(assessment(json!({
        "crisis_score": 85.0,
        "emotional_intensity": 9,
        "trigger_popup": false,
        "urgency_level": "high",
        "analysis": "Pronounced escalation versus baseline.",
        "new_personal_triggers": ["job loss"]
    }))));

    let a = engine
        .analyze_text("u2", "everything collapsed at work today", TextSource::Journal, None)
        .await
        .expect("analyze");
    assert!(a.is_crisis);
    assert_eq!(a.severity, Severity::Critical);
    // Score >= 60 forces the popup even when the oracle said no.
    assert!(a.should_trigger_popup);
    assert!(a.follow_up_question.is_none(), "popup replaces the follow-up");

    // Oracle-proposed triggers are merged into the profile.
    let p = engine.learning_profile("u2").await.expect("profile");
    assert!(p
        .personal_crisis_triggers
        .iter()
        .any(|t| t == "job loss"));
    assert_eq!(p.high_risk_count, 1);
}

#[tokio::test]
async fn learned_triggers_are_detected_in_later_analyses() {
    let engine = engine_with_oracle(MockOracle::with_assessment(assessment(json!({
        "crisis_score": 80.0,
        "new_personal_triggers": ["exams"]
    }))));

    // First analysis teaches the trigger.
    engine
        .analyze_text("u3", "rough day", TextSource::Chat, None)
        .await
        .expect("analyze");

    // Later analyses detect it as a personal trigger.
    let a = engine
        .analyze_text("u3", "exams are coming and I can't sleep", TextSource::Chat, None)
        .await
        .expect("analyze");
    assert_eq!(a.personal_triggers_detected, vec!["exams".to_string()]);
}

#[tokio::test]
async fn alert_gate_passes_then_cools_down() {
    let engine = engine_with_oracle(MockOracle::failing());
    let context = "user wrote they are going to kill myself tonight";

    let first = engine
        .evaluate_and_notify("u4", Severity::Critical, context, true)
        .await;
    assert!(first.alerted, "{}", first.reason);
    assert!(first.reason.contains("explicit imminent threat"));

    // Same user minutes later: blocked by cooldown even with a new phrase.
    let second = engine
        .evaluate_and_notify("u4", Severity::Critical, "about to jump off the bridge", true)
        .await;
    assert!(!second.alerted);
    assert!(second.reason.contains("cooldown"), "{}", second.reason);
}

#[tokio::test]
async fn alert_gate_blocks_below_critical() {
    let engine = engine_with_oracle(MockOracle::failing());

    let outcome = engine
        .evaluate_and_notify("u5", Severity::High, "going to kill myself", true)
        .await;
    assert!(!outcome.alerted);
    assert!(outcome.reason.contains("below critical threshold"));
}

/// Profile store whose reads always fail but whose writes reach the inner
/// store; models a transient read outage.
struct ReadOutageProfiles {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl ProfileStore for ReadOutageProfiles {
    async fn get(&self, _user_id: &str) -> Result<Option<UserLearningProfile>> {
        anyhow::bail!("read timeout")
    }
    async fn put(&self, profile: &UserLearningProfile) -> Result<()> {
        self.inner.put(profile).await
    }
}

#[tokio::test]
async fn failed_profile_read_never_clobbers_stored_history() {
    let inner = Arc::new(MemoryStore::new());

    // Seed a well-worn profile directly in the backing store.
    let now = chrono::Utc::now();
    let mut seeded = UserLearningProfile::new("u9", now);
    for i in 0..40 {
        seeded.record_analysis(
            &mindhaven_engine::profile::AnalysisOutcome {
                text: format!("entry {i}"),
                source: TextSource::Chat,
                severity: Severity::Critical,
                escalation_score: 85.0,
                detected_keywords: vec![],
                personal_triggers_detected: vec![],
                new_personal_triggers: vec![],
                coping_strategy_suggestions: vec![],
            },
            now,
        );
    }
    inner.put(&seeded).await.unwrap();

    let engine = CrisisEngine::new(
        Arc::new(ReadOutageProfiles { inner: inner.clone() }),
        inner.clone(),
        inner.clone(),
        Arc::new(MockOracle::failing()),
        NotifierMux::new(vec![]),
        AlertPolicy::default(),
    );

    // The analysis itself still succeeds in degraded mode.
    let a = engine
        .analyze_text("u9", "feeling hopeless", TextSource::Chat, None)
        .await
        .expect("analyze");
    assert!(!a.detected_keywords.is_empty());

    // The stored profile is untouched: the stand-in document was not written.
    let stored = inner.get("u9").await.unwrap().expect("seeded profile");
    assert_eq!(stored.total_interactions, 40);
    assert_eq!(stored.high_risk_count, 40);
    assert_eq!(stored.escalation_history.len(), 40);
}

/// Alert log that accepts nothing; forces the fail-closed path.
struct BrokenAlertLog;

#[async_trait]
impl AlertLogStore for BrokenAlertLog {
    async fn append(&self, _record: &CrisisAlertRecord) -> Result<()> {
        anyhow::bail!("disk on fire")
    }
    async fn set_delivery(&self, _alert_id: Uuid, _delivered: bool) -> Result<()> {
        anyhow::bail!("disk on fire")
    }
    async fn latest_sent(&self, _user_id: &str) -> Result<Option<CrisisAlertRecord>> {
        anyhow::bail!("disk on fire")
    }
}

#[tokio::test]
async fn alert_evaluation_fails_closed_on_storage_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = CrisisEngine::new(
        store.clone(),
        Arc::new(BrokenAlertLog),
        store,
        Arc::new(MockOracle::failing()),
        NotifierMux::new(vec![]),
        AlertPolicy::default(),
    );

    let outcome = engine
        .evaluate_and_notify("u6", Severity::Critical, "going to kill myself", true)
        .await;
    assert!(!outcome.alerted, "storage error must never produce an alert");
    assert_eq!(
        outcome.reason,
        "decision error (safety failsafe) - no alert sent"
    );
}

#[tokio::test]
async fn concurrent_analyses_serialize_per_user() {
    let engine = Arc::new(engine_with_oracle(MockOracle::failing()));

    let mut handles = Vec::new();
    for i in 0..60 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .analyze_text("u7", &format!("entry {i}: feeling empty inside"), TextSource::Chat, None)
                .await
                .expect("analyze")
        }));
    }
    for h in handles {
        h.await.expect("join");
    }

    let p = engine.learning_profile("u7").await.expect("profile");
    assert_eq!(p.total_interactions, 60, "no update may be lost");
    assert_eq!(p.escalation_history.len(), 50, "history stays capped");
}

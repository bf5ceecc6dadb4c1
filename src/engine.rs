//! # Crisis Engine
//! Orchestrates one analysis or alert-evaluation call end to end: profile
//! read-modify-write under a per-user lock, oracle call with rule fallback,
//! gatekeeper evaluation over consistent snapshots, and the notification
//! cascade.
//!
//! Error discipline (safety-critical):
//! - oracle failure → deterministic fallback, never surfaced;
//! - profile-read failure → the analysis runs against a fresh baseline and
//!   the profile write is skipped, so stored history is never clobbered;
//! - profile-write failure → logged and swallowed, the analysis is still
//!   returned;
//! - alert-log write failure before the notification attempt → fail closed;
//! - any internal error during gate evaluation → fail closed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use crate::analysis::{CrisisAnalysis, Severity, TextSource};
use crate::analytics::{self, AnalyticsReport};
use crate::gatekeeper::{self, AlertPolicy, GateInput};
use crate::lexicon;
use crate::notify::{self, NotifierMux};
use crate::oracle::{self, DynOracleClient};
use crate::profile::{AnalysisOutcome, UserLearningProfile};
use crate::scorer;
use crate::store::{
    AlertLogStore, CrisisAlertRecord, MemoryStore, MoodLogEntry, MoodLogStore, ProfileStore,
};

/// Practical bound for the analytics read; the report itself truncates
/// further (30 trend dates, 10 themes).
const ANALYTICS_LOG_LIMIT: usize = 1000;

/// Input-validation failure. The only error class the HTTP layer surfaces
/// as a client error; everything else is an internal failure.
#[derive(Debug)]
pub struct InvalidInput(pub &'static str);

impl std::fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for InvalidInput {}

/// Outcome of one authority-alert evaluation, caller-facing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertOutcome {
    pub alerted: bool,
    pub reason: String,
}

pub struct CrisisEngine {
    profiles: Arc<dyn ProfileStore>,
    alerts: Arc<dyn AlertLogStore>,
    mood_logs: Arc<dyn MoodLogStore>,
    oracle: DynOracleClient,
    notifier: NotifierMux,
    policy: AlertPolicy,
    // Serializes the profile read-modify-write per user; requests for
    // different users proceed in parallel. Entries are never evicted: the
    // map is bounded by the node's active user population (one small Arc
    // per user), which is acceptable for a single-node deployment.
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CrisisEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        alerts: Arc<dyn AlertLogStore>,
        mood_logs: Arc<dyn MoodLogStore>,
        oracle: DynOracleClient,
        notifier: NotifierMux,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            profiles,
            alerts,
            mood_logs,
            oracle,
            notifier,
            policy,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory stores + env-configured oracle, notifier and policy.
    pub fn in_memory_from_env() -> Self {
        let store = Arc::new(MemoryStore::new());
        let oracle_cfg = oracle::load_oracle_config();
        Self::new(
            store.clone(),
            store.clone(),
            store,
            oracle::build_client_from_config(&oracle_cfg),
            NotifierMux::from_env(),
            AlertPolicy::from_env(),
        )
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut g = self.user_locks.lock().expect("user lock map poisoned");
        g.entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Analyze one text event and update the user's learning profile.
    ///
    /// Only genuine input-validation problems return `Err`; oracle and
    /// persistence trouble degrade internally so the caller always gets a
    /// well-formed analysis.
    pub async fn analyze_text(
        &self,
        user_id: &str,
        text: &str,
        source: TextSource,
        context: Option<&serde_json::Value>,
    ) -> Result<CrisisAnalysis> {
        if user_id.trim().is_empty() {
            return Err(InvalidInput("user_id must not be empty").into());
        }
        counter!("crisis_analyses_total").increment(1);

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let now = Utc::now();

        let (mut profile, profile_read_ok) = match self.profiles.get(user_id).await {
            Ok(Some(p)) => (p, true),
            Ok(None) => (UserLearningProfile::new(user_id, now), true),
            Err(err) => {
                // Degraded mode: analyze against a fresh baseline rather
                // than failing the user-facing call.
                warn!(error = %err, "profile read failed, analyzing without history");
                (UserLearningProfile::new(user_id, now), false)
            }
        };

        let detected_keywords = lexicon::match_keywords(text);
        let personal_triggers =
            lexicon::match_personal_triggers(&profile.personal_crisis_triggers, text);
        let avg_recent = profile.recent_average_score();

        let prompt = oracle::build_analysis_prompt(
            &profile,
            avg_recent,
            text,
            source.as_str(),
            context,
        );
        let assessment = match self.oracle.assess(&prompt).await {
            Some(a) => a,
            None => {
                counter!("oracle_fallbacks_total").increment(1);
                scorer::fallback_assessment(&detected_keywords, &personal_triggers)
            }
        };

        let analysis = scorer::build_analysis(
            &assessment,
            detected_keywords.clone(),
            personal_triggers.clone(),
            avg_recent,
        );

        // Learning side effects, applied as one profile write. A failed
        // write loses freshness, not the user-facing judgment.
        profile.record_analysis(
            &AnalysisOutcome {
                text: text.to_string(),
                source,
                severity: analysis.severity,
                escalation_score: analysis.escalation_score,
                detected_keywords,
                personal_triggers_detected: personal_triggers,
                new_personal_triggers: assessment.new_personal_triggers.clone(),
                coping_strategy_suggestions: assessment.coping_strategy_suggestions.clone(),
            },
            now,
        );
        if !profile_read_ok {
            // The stand-in profile must never overwrite the stored document:
            // a transient read failure would otherwise wipe the ledger and
            // learned triggers. This analysis is simply not learned from.
            warn!("profile write skipped after failed read");
        } else if let Err(err) = self.profiles.put(&profile).await {
            warn!(error = %err, "profile update failed, returning analysis anyway");
        }

        info!(
            text_id = %anon_hash(text),
            source = source.as_str(),
            score = analysis.escalation_score,
            severity = analysis.severity.as_str(),
            escalation = ?analysis.escalation_type,
            "crisis analysis completed"
        );
        Ok(analysis)
    }

    /// Evaluate the ultra-conservative authority-alert gate and, when it
    /// passes, run the notification cascade. Never errors: any internal
    /// failure collapses to a fail-closed "no alert" outcome.
    pub async fn evaluate_and_notify(
        &self,
        user_id: &str,
        severity: Severity,
        crisis_context: &str,
        user_consent: bool,
    ) -> AlertOutcome {
        counter!("alert_evaluations_total").increment(1);
        match self
            .evaluate_and_notify_inner(user_id, severity, crisis_context, user_consent)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "alert evaluation error, failing closed");
                AlertOutcome {
                    alerted: false,
                    reason: "decision error (safety failsafe) - no alert sent".to_string(),
                }
            }
        }
    }

    async fn evaluate_and_notify_inner(
        &self,
        user_id: &str,
        severity: Severity,
        crisis_context: &str,
        user_consent: bool,
    ) -> Result<AlertOutcome> {
        if user_id.trim().is_empty() {
            return Err(InvalidInput("user_id must not be empty").into());
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let now = Utc::now();

        let last_sent = self
            .alerts
            .latest_sent(user_id)
            .await
            .context("alert history read")?;
        let profile = self.profiles.get(user_id).await.context("profile read")?;

        let decision = gatekeeper::evaluate(
            &self.policy,
            &GateInput {
                severity,
                crisis_context,
                last_sent_alert: last_sent.as_ref(),
                profile: profile.as_ref(),
                now,
            },
        );

        if !decision.alert {
            info!(user_id, reason = %decision.reason, "authority alert NOT sent");
            // Record the blocked evaluation; best-effort, nothing depends
            // on this row existing.
            let record = CrisisAlertRecord {
                alert_id: uuid::Uuid::new_v4(),
                user_id: user_id.to_string(),
                severity,
                crisis_context: crisis_context.to_string(),
                ai_message: "Alert evaluated but did not meet threshold for authority notification"
                    .to_string(),
                email_sent: false,
                delivered: false,
                decision_reason: decision.reason.clone(),
                timestamp: now,
                user_consent,
            };
            if let Err(err) = self.alerts.append(&record).await {
                warn!(error = %err, "failed to record blocked alert evaluation");
            }
            return Ok(AlertOutcome {
                alerted: false,
                reason: decision.reason,
            });
        }

        // Oracle-written risk summary, deterministic fallback otherwise.
        let summary_prompt = format!(
            "Generate a brief, professional crisis intervention message for emergency \
             services (3-4 sentences).\n\nContext: {crisis_context}\nSeverity: {}\n\n\
             Describe the concerning situation clearly, recommend immediate actions, \
             and convey appropriate urgency.",
            severity.as_str()
        );
        let ai_message = match self.oracle.complete(&summary_prompt).await {
            Some(m) => m,
            None => format!(
                "A user is experiencing a CRITICAL mental health crisis with imminent risk. \
                 Immediate professional intervention is strongly recommended. Context: {}",
                crate::profile::truncate_sample(crisis_context)
            ),
        };

        // The cooldown record must exist before the transport runs; if it
        // cannot be written, fail closed (rule discipline over delivery).
        let record = CrisisAlertRecord {
            alert_id: uuid::Uuid::new_v4(),
            user_id: user_id.to_string(),
            severity,
            crisis_context: crisis_context.to_string(),
            ai_message: ai_message.clone(),
            email_sent: true,
            delivered: false,
            decision_reason: decision.reason.clone(),
            timestamp: now,
            user_consent,
        };
        self.alerts
            .append(&record)
            .await
            .context("cooldown record write")?;

        let event = notify::compose_alert(user_id, severity, crisis_context, &ai_message, now);
        let delivered = self.notifier.dispatch(&event).await;
        counter!("authority_alerts_sent_total").increment(1);
        if let Err(err) = self.alerts.set_delivery(record.alert_id, delivered).await {
            // The notification already happened; the stale flag is a
            // bookkeeping problem, not a safety one.
            warn!(error = %err, "failed to record delivery outcome");
        }

        info!(user_id, reason = %decision.reason, delivered, "authority alert dispatched");
        Ok(AlertOutcome {
            alerted: true,
            reason: decision.reason,
        })
    }

    /// Build the in-app emergency-response bundle; oracle recommendations
    /// are best-effort, the hotline directory and messaging are static.
    pub async fn emergency_response(
        &self,
        country: Option<&str>,
        severity: Severity,
        crisis_context: &str,
    ) -> crate::hotlines::EmergencyResponse {
        let prompt = format!(
            "Based on this crisis situation, recommend 3-5 immediate helpful resources or \
             actions.\n\nSeverity: {}\nContext: {crisis_context}\n\nReturn as a simple \
             numbered list, one recommendation per line.",
            severity.as_str()
        );
        let recs = self
            .oracle
            .complete(&prompt)
            .await
            .map(|raw| parse_recommendations(&raw));
        crate::hotlines::emergency_response(country, severity, recs)
    }

    /// Append one mood log entry (analytics input).
    pub async fn log_mood(&self, user_id: &str, text: &str) -> Result<MoodLogEntry> {
        if user_id.trim().is_empty() {
            return Err(InvalidInput("user_id must not be empty").into());
        }
        let entry = MoodLogEntry::new(user_id, text, Utc::now());
        self.mood_logs.append(&entry).await.context("mood log write")?;
        Ok(entry)
    }

    /// Read-only aggregation over the user's mood logs.
    pub async fn compute_analytics(&self, user_id: &str) -> Result<AnalyticsReport> {
        let logs = self
            .mood_logs
            .for_user(user_id, ANALYTICS_LOG_LIMIT)
            .await
            .context("mood log read")?;
        Ok(analytics::compute(&logs, Utc::now()))
    }

    /// Learning profile for a user, created lazily on first access.
    pub async fn learning_profile(&self, user_id: &str) -> Result<UserLearningProfile> {
        if user_id.trim().is_empty() {
            return Err(InvalidInput("user_id must not be empty").into());
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        if let Some(p) = self.profiles.get(user_id).await? {
            return Ok(p);
        }
        let p = UserLearningProfile::new(user_id, Utc::now());
        self.profiles.put(&p).await?;
        Ok(p)
    }
}

/// Numbered/bulleted completion lines → clean recommendation strings.
fn parse_recommendations(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.trim_start_matches(|c: char| c.is_ascii_digit() || ".-) ".contains(c))
                .to_string()
        })
        .filter(|l| !l.is_empty())
        .take(5)
        .collect()
}

/// Short anonymized id for log lines. Raw user text is never logged.
fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

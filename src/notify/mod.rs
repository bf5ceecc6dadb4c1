//! Notification transport for authority alerts.
//!
//! Delivery cascades primary → secondary → durable log record. Failures are
//! captured in the alert log (`email_sent=false`) but never raise back to
//! the crisis-handling call path: the user-facing interaction must complete
//! normally regardless of transport outcome.

pub mod email;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::Severity;

/// Payload handed to every channel.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub user_id: String,
    pub severity: Severity,
    pub subject: String,
    pub body: String,
    pub ts: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AlertEvent) -> Result<()>;
    /// Channel name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Ordered fan-out over the configured channels; first success wins.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Channels from environment: SMTP first (primary), webhook second.
    /// Missing configuration just drops that channel.
    pub fn from_env() -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        match email::EmailNotifier::from_env() {
            Ok(e) => channels.push(Box::new(e)),
            Err(err) => tracing::debug!(error = %err, "email channel disabled"),
        }
        if let Some(w) = webhook::WebhookNotifier::from_env() {
            channels.push(Box::new(w));
        }
        Self::new(channels)
    }

    /// Attempt delivery; `true` iff some channel delivered. When every
    /// channel fails the event is written to the process log as the durable
    /// last resort (the alert-log row carries the full body either way).
    pub async fn dispatch(&self, ev: &AlertEvent) -> bool {
        for ch in &self.channels {
            match ch.send(ev).await {
                Ok(()) => {
                    tracing::info!(
                        channel = ch.name(),
                        user_id = %ev.user_id,
                        severity = ev.severity.as_str(),
                        "authority alert delivered"
                    );
                    return true;
                }
                Err(err) => {
                    tracing::warn!(
                        channel = ch.name(),
                        error = %err,
                        "alert channel failed, trying next"
                    );
                }
            }
        }
        tracing::error!(
            user_id = %ev.user_id,
            severity = ev.severity.as_str(),
            subject = %ev.subject,
            "ALL alert channels failed - alert captured in log only"
        );
        false
    }
}

/// Compose the authority notification. The body is plain text, structured
/// for a human dispatcher; the risk summary comes from the oracle or a
/// deterministic fallback sentence.
pub fn compose_alert(
    user_id: &str,
    severity: Severity,
    crisis_context: &str,
    risk_summary: &str,
    now: DateTime<Utc>,
) -> AlertEvent {
    let subject = format!(
        "URGENT: Mental Health Crisis Alert - {} Priority [USER: {}]",
        severity.as_str().to_uppercase(),
        user_id
    );
    let body = format!(
        "EMERGENCY MENTAL HEALTH ALERT - VERIFIED CRITICAL SITUATION\n\n\
         This alert passed strict verification checks and represents a genuine crisis\n\
         requiring immediate attention.\n\n\
         INCIDENT DETAILS\n\
         Severity: {severity}\n\
         User id: {user_id}\n\
         Timestamp: {ts} UTC\n\n\
         CRISIS CONTEXT\n\
         {crisis_context}\n\n\
         RISK ASSESSMENT\n\
         {risk_summary}\n\n\
         RECOMMENDED IMMEDIATE ACTIONS\n\
         1. Assess immediate safety and risk level\n\
         2. Contact user through registered emergency contacts if possible\n\
         3. Consider mobile crisis team or wellness check dispatch\n\
         4. Document all actions taken\n\n\
         EMERGENCY RESOURCES\n\
         - 988 Suicide & Crisis Lifeline: call or text 988\n\
         - Crisis Text Line: text HOME to 741741\n\
         - Emergency Services: 911\n",
        severity = severity.as_str().to_uppercase(),
        ts = now.format("%Y-%m-%d %H:%M:%S"),
    );
    AlertEvent {
        user_id: user_id.to_string(),
        severity,
        subject,
        body,
        ts: now,
    }
}

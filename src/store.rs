//! store.rs - persistence seams for profiles, alert logs and mood logs.
//!
//! Document get/set semantics only; the real database is an external
//! collaborator. The in-memory implementation backs tests and local runs and
//! doubles as the reference for the required semantics: alert logs are
//! append-only, mood logs are a per-user time-ordered read.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Severity;
use crate::profile::UserLearningProfile;

/// One row per evaluated authority-alert decision - blocked evaluations are
/// recorded too, with `email_sent=false` and the blocking reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisAlertRecord {
    pub alert_id: Uuid,
    pub user_id: String,
    pub severity: Severity,
    pub crisis_context: String,
    /// Generated notification body, or empty when no alert was sent.
    pub ai_message: String,
    /// Gate decision: true iff an authority alert was issued. This is what
    /// the cooldown rule reads, independent of transport success.
    pub email_sent: bool,
    /// Transport outcome, recorded after the notification cascade ran.
    pub delivered: bool,
    /// Which rule path fired, in plain language.
    pub decision_reason: String,
    pub timestamp: DateTime<Utc>,
    pub user_consent: bool,
}

/// Analytics input; immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl MoodLogEntry {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            text: text.into(),
            timestamp,
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserLearningProfile>>;
    /// Whole-document write; one call per analysis keeps the profile
    /// internally consistent.
    async fn put(&self, profile: &UserLearningProfile) -> Result<()>;
}

#[async_trait]
pub trait AlertLogStore: Send + Sync {
    /// Rows are append-only; a passing decision is appended with
    /// `email_sent=true` BEFORE the notification attempt so the cooldown
    /// record exists first (first writer wins under concurrency).
    async fn append(&self, record: &CrisisAlertRecord) -> Result<()>;
    /// Record the transport outcome (`delivered`) after the cascade ran.
    /// This is the only mutation an alert row ever sees; `email_sent` is
    /// immutable so a failed transport never re-opens the cooldown.
    async fn set_delivery(&self, alert_id: Uuid, delivered: bool) -> Result<()>;
    /// Most recent record with `email_sent=true` for this user, any age.
    async fn latest_sent(&self, user_id: &str) -> Result<Option<CrisisAlertRecord>>;
}

#[async_trait]
pub trait MoodLogStore: Send + Sync {
    async fn append(&self, entry: &MoodLogEntry) -> Result<()>;
    /// Chronologically ordered entries for a user, capped at `limit`
    /// most recent.
    async fn for_user(&self, user_id: &str, limit: usize) -> Result<Vec<MoodLogEntry>>;
}

/// In-memory store. Interior mutability via `Mutex`; fine for the request
/// volumes a single node sees, and deterministic for tests.
#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, UserLearningProfile>>,
    alerts: Mutex<Vec<CrisisAlertRecord>>,
    mood_logs: Mutex<Vec<MoodLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserLearningProfile>> {
        let g = self.profiles.lock().expect("profile store poisoned");
        Ok(g.get(user_id).cloned())
    }

    async fn put(&self, profile: &UserLearningProfile) -> Result<()> {
        let mut g = self.profiles.lock().expect("profile store poisoned");
        g.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertLogStore for MemoryStore {
    async fn append(&self, record: &CrisisAlertRecord) -> Result<()> {
        let mut g = self.alerts.lock().expect("alert log poisoned");
        g.push(record.clone());
        Ok(())
    }

    async fn set_delivery(&self, alert_id: Uuid, delivered: bool) -> Result<()> {
        let mut g = self.alerts.lock().expect("alert log poisoned");
        if let Some(r) = g.iter_mut().find(|r| r.alert_id == alert_id) {
            r.delivered = delivered;
        }
        Ok(())
    }

    async fn latest_sent(&self, user_id: &str) -> Result<Option<CrisisAlertRecord>> {
        let g = self.alerts.lock().expect("alert log poisoned");
        Ok(g
            .iter()
            .filter(|r| r.user_id == user_id && r.email_sent)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }
}

#[async_trait]
impl MoodLogStore for MemoryStore {
    async fn append(&self, entry: &MoodLogEntry) -> Result<()> {
        let mut g = self.mood_logs.lock().expect("mood log poisoned");
        g.push(entry.clone());
        Ok(())
    }

    async fn for_user(&self, user_id: &str, limit: usize) -> Result<Vec<MoodLogEntry>> {
        let g = self.mood_logs.lock().expect("mood log poisoned");
        let mut entries: Vec<MoodLogEntry> =
            g.iter().filter(|e| e.user_id == user_id).cloned().collect();
        entries.sort_by_key(|e| e.timestamp);
        let start = entries.len().saturating_sub(limit);
        Ok(entries.split_off(start))
    }
}

//! Completion-oracle adapter: provider abstraction, prompt building and
//! tolerant JSON extraction.
//!
//! The oracle is advisory only. Every call site must survive a `None` (the
//! scorer falls back to its deterministic rules), so providers never return
//! errors - any timeout, non-2xx or unparsable body collapses to `None`.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::Severity;
use crate::profile::UserLearningProfile;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Structured judgment from the oracle. Every field is defaulted so a
/// partially-filled response still parses; a raw unstructured blob never
/// reaches scoring logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAssessment {
    #[serde(default)]
    pub crisis_score: f64,
    #[serde(default = "default_intensity")]
    pub emotional_intensity: u8,
    #[serde(default)]
    pub escalation_assessment: Option<String>,
    #[serde(default)]
    pub detected_emotions: Vec<String>,
    #[serde(default)]
    pub comparison_to_baseline: Option<String>,
    #[serde(default)]
    pub trigger_popup: bool,
    #[serde(default = "default_urgency")]
    pub urgency_level: Severity,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub new_personal_triggers: Vec<String>,
    #[serde(default)]
    pub coping_strategy_suggestions: Vec<String>,
}

fn default_intensity() -> u8 {
    1
}

fn default_urgency() -> Severity {
    Severity::Low
}

/// Trait object used by the engine and tests.
pub trait OracleClient: Send + Sync {
    /// Run the prompt; `None` on any failure (the caller falls back to rules).
    fn assess<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<OracleAssessment>> + Send + 'a>>;
    /// Free-form short completion (alert-message composition). `None` on failure.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynOracleClient = Arc<dyn OracleClient>;

/// Config loaded from `config/oracle.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub enabled: bool,
    /// "gemini" is the only real provider for now.
    pub provider: Option<String>,
    /// Request timeout; defaults to 10s if absent.
    pub timeout_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            timeout_secs: Some(10),
        }
    }
}

/// Load config from `config/oracle.json`; defaults on any read/parse failure.
pub fn load_oracle_config() -> OracleConfig {
    let path = Path::new("config/oracle.json");
    match std::fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => OracleConfig::default(),
    }
}

/// Factory: build a client according to config and environment.
///
/// * `ORACLE_TEST_MODE=mock` returns a deterministic mock client.
/// * `enabled==false` returns a disabled client (scorer always falls back).
/// * Otherwise the configured provider.
pub fn build_client_from_config(config: &OracleConfig) -> DynOracleClient {
    if std::env::var("ORACLE_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockOracle::calm());
    }

    if !config.enabled {
        return Arc::new(DisabledOracle);
    }

    match config.provider.as_deref() {
        Some("gemini") => Arc::new(GeminiOracle::new(
            None,
            Duration::from_secs(config.timeout_secs.unwrap_or(10)),
        )),
        _ => Arc::new(DisabledOracle),
    }
}

// ------------------------------------------------------------
// Prompt building
// ------------------------------------------------------------

/// Seed the oracle with the user's baseline, triggers and recent trend so
/// its judgment is personalized, then demand strict JSON output.
pub fn build_analysis_prompt(
    profile: &UserLearningProfile,
    avg_recent_score: f64,
    text: &str,
    source: &str,
    context: Option<&serde_json::Value>,
) -> String {
    let baseline = &profile.emotional_baseline;
    let typical = if baseline.typical_keywords.is_empty() {
        "None yet".to_string()
    } else {
        baseline.typical_keywords[..baseline.typical_keywords.len().min(10)].join(", ")
    };
    let triggers = if profile.personal_crisis_triggers.is_empty() {
        "None identified yet".to_string()
    } else {
        profile.personal_crisis_triggers[..profile.personal_crisis_triggers.len().min(5)].join(", ")
    };
    let ctx = context
        .map(|c| c.to_string())
        .unwrap_or_else(|| "No additional context".to_string());

    format!(
        "You are a mental health crisis detection assistant. Analyze this text for signs of \
         emotional distress or crisis.\n\n\
         User's emotional baseline:\n\
         - Average mood: {avg_mood:.1}/10\n\
         - Baseline sentiment: {sentiment:?}\n\
         - Typical keywords: {typical}\n\
         - Personal triggers: {triggers}\n\
         - Recent average escalation: {avg_recent_score:.1}/100\n\
         - High risk incidents: {high_risk}\n\
         - Total interactions: {total}\n\n\
         Text to analyze (from {source}):\n\"{text}\"\n\n\
         Context: {ctx}\n\n\
         Respond with a single JSON object with these fields:\n\
         crisis_score (0-100), emotional_intensity (1-10), escalation_assessment \
         (\"none\"|\"sudden_spike\"|\"gradual\"|\"both\"), detected_emotions (list), \
         comparison_to_baseline (string), trigger_popup (bool), urgency_level \
         (\"low\"|\"medium\"|\"high\"|\"critical\"), analysis (string), recommended_actions \
         (list of 2-3), new_personal_triggers (list), coping_strategy_suggestions (list).\n\
         Format as valid JSON.",
        avg_mood = baseline.average_mood_score,
        sentiment = baseline.baseline_sentiment,
        high_risk = profile.high_risk_count,
        total = profile.total_interactions,
    )
}

/// Extract a JSON object from a completion that may wrap it in markdown
/// code fences (```json ... ``` or plain ``` ... ```).
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    let candidate = if let Some(rest) = trimmed.split("```json").nth(1) {
        rest.split("```").next().unwrap_or("")
    } else if let Some(rest) = trimmed.split("```").nth(1) {
        rest.split("```").next().unwrap_or("")
    } else {
        trimmed
    };
    serde_json::from_str(candidate.trim()).ok()
}

fn parse_assessment(raw: &str) -> Option<OracleAssessment> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).ok()
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// Gemini provider (generateContent API). Requires `GEMINI_API_KEY`.
pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiOracle {
    /// `model_override`: pass Some("gemini-1.5-pro") to override the default flash model.
    pub fn new(model_override: Option<&str>, timeout: Duration) -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("mindhaven-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gemini-1.5-flash").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: String,
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self.http.post(&url).json(&req).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())?;
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl OracleClient for GeminiOracle {
    fn assess<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<OracleAssessment>> + Send + 'a>> {
        Box::pin(async move {
            let raw = self.generate(prompt).await?;
            parse_assessment(&raw)
        })
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(self.generate(prompt))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

/// Returns `None` always; the scorer's rule-based path takes over.
pub struct DisabledOracle;

impl OracleClient for DisabledOracle {
    fn assess<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<OracleAssessment>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic oracle for tests and local runs.
#[derive(Clone)]
pub struct MockOracle {
    pub assessment: Option<OracleAssessment>,
    pub completion: Option<String>,
}

impl MockOracle {
    /// A mock that sees no crisis at all.
    pub fn calm() -> Self {
        Self {
            assessment: Some(OracleAssessment {
                crisis_score: 5.0,
                emotional_intensity: 2,
                escalation_assessment: Some("none".into()),
                detected_emotions: vec![],
                comparison_to_baseline: Some("Consistent with typical baseline (mock)".into()),
                trigger_popup: false,
                urgency_level: Severity::Low,
                analysis: "No crisis indicators present (mock)".into(),
                recommended_actions: vec![],
                new_personal_triggers: vec![],
                coping_strategy_suggestions: vec![],
            }),
            completion: Some("Mock completion".into()),
        }
    }

    pub fn with_assessment(assessment: OracleAssessment) -> Self {
        Self {
            assessment: Some(assessment),
            completion: Some("Mock completion".into()),
        }
    }

    /// A mock that always fails, to exercise fallback paths.
    pub fn failing() -> Self {
        Self {
            assessment: None,
            completion: None,
        }
    }
}

impl OracleClient for MockOracle {
    fn assess<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<OracleAssessment>> + Send + 'a>> {
        let out = self.assessment.clone();
        Box::pin(async move { out })
    }
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.completion.clone();
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

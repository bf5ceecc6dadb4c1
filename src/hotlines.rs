//! hotlines.rs - country-keyed crisis-hotline directory and the in-app
//! emergency-response bundle (hotlines, urgent message, resource lists).
//!
//! The directory is an immutable lookup table embedded at build time; there
//! is no runtime mutation path.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::analysis::Severity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hotline {
    pub name: String,
    pub number: String,
    pub available: String,
    pub country: String,
}

static HOTLINES: Lazy<HashMap<String, Vec<Hotline>>> = Lazy::new(|| {
    let raw = include_str!("../hotlines.json");
    serde_json::from_str::<HashMap<String, Vec<Hotline>>>(raw).expect("valid hotline directory")
});

const DEFAULT_COUNTRY: &str = "United States";

/// Hotlines for a country; unknown countries fall back to the US directory.
pub fn hotlines_for(country: &str) -> &'static [Hotline] {
    HOTLINES
        .get(country)
        .or_else(|| HOTLINES.get(DEFAULT_COUNTRY))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Everything the safety UI shows during an emergency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub crisis_hotlines: Vec<Hotline>,
    pub recommended_resources: Vec<String>,
    pub urgent_message: String,
    pub follow_up_resources: Vec<String>,
}

/// Build the bundle. `oracle_recommendations` is best-effort output from the
/// completion oracle; when absent the deterministic default list is used.
pub fn emergency_response(
    country: Option<&str>,
    severity: Severity,
    oracle_recommendations: Option<Vec<String>>,
) -> EmergencyResponse {
    let urgent_message = match severity {
        Severity::Critical => {
            "IMMEDIATE ATTENTION NEEDED: If you're in immediate danger or having thoughts of \
             harming yourself, please call emergency services (911) or go to the nearest \
             emergency room right now. You deserve help and support."
        }
        Severity::High => {
            "HIGH PRIORITY: Your safety is important. Please reach out to someone you trust or \
             call a crisis hotline immediately. You don't have to go through this alone."
        }
        Severity::Medium => {
            "SUPPORT AVAILABLE: It sounds like you're going through a difficult time. Consider \
             reaching out to someone who can support you. Help is available 24/7."
        }
        Severity::Low => {
            "WE'RE HERE: Remember that support is always available if you need it. You're \
             taking a positive step by seeking help."
        }
    };

    let recommended_resources = oracle_recommendations
        .filter(|r| !r.is_empty())
        .unwrap_or_else(default_recommendations);

    EmergencyResponse {
        crisis_hotlines: hotlines_for(country.unwrap_or(DEFAULT_COUNTRY)).to_vec(),
        recommended_resources,
        urgent_message: urgent_message.to_string(),
        follow_up_resources: vec![
            "Visit your Crisis Support page to create a safety plan".to_string(),
            "Schedule an appointment with a mental health professional".to_string(),
            "Join a support group in your area or online".to_string(),
            "Practice daily self-care and coping strategies".to_string(),
        ],
    }
}

fn default_recommendations() -> Vec<String> {
    vec![
        "Practice 5-4-3-2-1 grounding: name 5 things you see, 4 you can touch, 3 you hear, \
         2 you smell, 1 you taste"
            .to_string(),
        "Try box breathing: breathe in for 4, hold for 4, out for 4, hold for 4".to_string(),
        "Write down your feelings in a journal".to_string(),
        "Go to a safe, comfortable place if possible".to_string(),
        "Consider reaching out to a therapist or counselor".to_string(),
    ]
}

//! lexicon.rs - fixed crisis-indicator lexicon and the keyword matcher.
//!
//! Matching is substring containment over lowercased text, not tokenization.
//! That is deliberately permissive so phrase variants ("feeling hopeless
//! again") still hit; later pipeline stages compensate for the extra
//! false positives.

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::analysis::{CrisisDetection, Severity};

#[derive(Debug, Deserialize)]
struct LexiconFile {
    keywords: Vec<String>,
    high_severity: Vec<String>,
    medium_severity: Vec<String>,
    explicit_imminent: Vec<String>,
}

static LEXICON: Lazy<LexiconFile> = Lazy::new(|| {
    let raw = include_str!("../crisis_lexicon.json");
    serde_json::from_str::<LexiconFile>(raw).expect("valid crisis lexicon")
});

static STOP_WORDS: Lazy<Vec<String>> = Lazy::new(|| {
    let raw = include_str!("../stop_words.json");
    serde_json::from_str::<Vec<String>>(raw).expect("valid stop word list")
});

/// Crisis-indicator phrases present in `text` (case-insensitive containment).
pub fn match_keywords(text: &str) -> Vec<String> {
    contained(&LEXICON.keywords, &text.to_lowercase())
}

/// Subset of a user's personal trigger phrases present in `text`.
pub fn match_personal_triggers(triggers: &[String], text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    triggers
        .iter()
        .filter(|t| !t.is_empty() && lower.contains(&t.to_lowercase()))
        .cloned()
        .collect()
}

/// True if the text names an imminent action ("going to kill myself",
/// "overdose now", ...). Used only by the authority-alert gate; the list is
/// much narrower than the general lexicon.
pub fn has_explicit_imminent_threat(text: &str) -> bool {
    let lower = text.to_lowercase();
    LEXICON.explicit_imminent.iter().any(|p| lower.contains(p))
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.iter().any(|w| w == word)
}

fn contained(phrases: &[String], lower_text: &str) -> Vec<String> {
    phrases
        .iter()
        .filter(|p| lower_text.contains(p.as_str()))
        .cloned()
        .collect()
}

/// Stateless quick scan: no profile, no oracle, three-tier severity from
/// keyword sub-lists. Used by the chat surface for an immediate first read
/// before the full analysis pipeline runs.
pub fn quick_scan(message: &str) -> CrisisDetection {
    let lower = message.to_lowercase();
    let detected = contained(&LEXICON.keywords, &lower);

    if detected.is_empty() {
        return CrisisDetection {
            is_crisis: false,
            severity: Severity::Low,
            detected_keywords: detected,
            follow_up_question: None,
        };
    }

    let (severity, follow_up) = if LEXICON.high_severity.iter().any(|k| lower.contains(k.as_str())) {
        (
            Severity::High,
            "I'm really concerned about what you're sharing. Are you having thoughts of \
             hurting yourself right now? It's important that we get you immediate support.",
        )
    } else if LEXICON
        .medium_severity
        .iter()
        .any(|k| lower.contains(k.as_str()))
    {
        (
            Severity::Medium,
            "I hear that you're going through a really difficult time. Have you been having \
             thoughts about ending your life? I want to make sure you have the support you need.",
        )
    } else {
        (
            Severity::Low,
            "Thank you for sharing that with me. Can you tell me more about what you're \
             experiencing? I want to understand better so I can provide you with the right support.",
        )
    };

    CrisisDetection {
        is_crisis: true,
        severity,
        detected_keywords: detected,
        follow_up_question: Some(follow_up.to_string()),
    }
}

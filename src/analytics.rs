//! analytics.rs - read-only aggregation over a user's mood logs: daily
//! trend, hour-of-day distribution, word-frequency themes, logging streaks
//! and deterministic insight sentences.
//!
//! Pure functions over a slice of logs; "now" is an explicit parameter so
//! streaks and windows are testable without a clock.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::lexicon;
use crate::store::MoodLogEntry;

/// How many trend dates the report keeps (most recent first-truncated).
const TREND_DAYS: usize = 30;
const TOP_THEMES: usize = 10;
/// Tokens this short carry no theme signal.
const MIN_TOKEN_LEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    /// Calendar date (UTC) as `YYYY-MM-DD`.
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeCount {
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_logs: u64,
    /// Chronologically sorted, truncated to the most recent 30 dates.
    pub mood_trend: Vec<TrendPoint>,
    /// Hour-of-day (0-23) → count; values always sum to `total_logs`.
    pub hourly_distribution: BTreeMap<u8, u64>,
    pub common_themes: Vec<ThemeCount>,
    pub insights: Vec<String>,
    pub current_streak: u64,
    pub longest_streak: u64,
}

impl AnalyticsReport {
    /// Canonical zero-valued report for users with no logs. A defined edge
    /// case, not an error.
    pub fn empty() -> Self {
        Self {
            total_logs: 0,
            mood_trend: Vec::new(),
            hourly_distribution: BTreeMap::new(),
            common_themes: Vec::new(),
            insights: Vec::new(),
            current_streak: 0,
            longest_streak: 0,
        }
    }
}

/// Aggregate a user's logs into a report. `logs` need not be pre-sorted.
pub fn compute(logs: &[MoodLogEntry], now: DateTime<Utc>) -> AnalyticsReport {
    if logs.is_empty() {
        return AnalyticsReport::empty();
    }

    let mut sorted: Vec<&MoodLogEntry> = logs.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);
    let total_logs = sorted.len() as u64;

    // Daily trend (UTC calendar dates), chronological, last 30.
    let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for e in &sorted {
        *by_date.entry(e.timestamp.date_naive()).or_insert(0) += 1;
    }
    let mut mood_trend: Vec<TrendPoint> = by_date
        .iter()
        .map(|(d, c)| TrendPoint {
            date: d.format("%Y-%m-%d").to_string(),
            count: *c,
        })
        .collect();
    if mood_trend.len() > TREND_DAYS {
        mood_trend.drain(0..mood_trend.len() - TREND_DAYS);
    }

    // Hour-of-day distribution across all logs.
    let mut hourly_distribution: BTreeMap<u8, u64> = BTreeMap::new();
    for e in &sorted {
        *hourly_distribution.entry(e.timestamp.hour() as u8).or_insert(0) += 1;
    }

    let common_themes = common_themes(&sorted);

    let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
    let today = now.date_naive();
    let current_streak = current_streak(&dates, today);
    let longest_streak = longest_streak(&dates);

    let insights = insights(
        &sorted,
        &hourly_distribution,
        &mood_trend,
        &common_themes,
        current_streak,
        longest_streak,
        now,
    );

    AnalyticsReport {
        total_logs,
        mood_trend,
        hourly_distribution,
        common_themes,
        insights,
        current_streak,
        longest_streak,
    }
}

/// Lowercase whitespace tokens, punctuation-stripped; short tokens and stop
/// words dropped. Top 10 by descending count; ties keep first-seen order.
fn common_themes(sorted: &[&MoodLogEntry]) -> Vec<ThemeCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for e in sorted {
        for raw in e.text.to_lowercase().split_whitespace() {
            let word = raw.trim_matches(|c: char| ".,!?;:".contains(c));
            if word.chars().count() < MIN_TOKEN_LEN || lexicon::is_stop_word(word) {
                continue;
            }
            let entry = counts.entry(word.to_string()).or_insert(0);
            if *entry == 0 {
                order.push(word.to_string());
            }
            *entry += 1;
        }
    }

    let mut themes: Vec<ThemeCount> = order
        .into_iter()
        .map(|word| {
            let count = counts[&word];
            ThemeCount { word, count }
        })
        .collect();
    // Stable sort keeps insertion order within equal counts.
    themes.sort_by(|a, b| b.count.cmp(&a.count));
    themes.truncate(TOP_THEMES);
    themes
}

/// Length of the consecutive-day run ending at `today` or yesterday; 0 if
/// the most recent log date is neither. `dates` is sorted and distinct.
fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> u64 {
    let Some(&last) = dates.last() else { return 0 };
    if last != today && last != today - Duration::days(1) {
        return 0;
    }
    let mut streak = 1u64;
    for w in dates.windows(2).rev() {
        if w[1] - w[0] == Duration::days(1) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Longest consecutive-day run anywhere in the (sorted, distinct) date set.
fn longest_streak(dates: &[NaiveDate]) -> u64 {
    if dates.is_empty() {
        return 0;
    }
    let mut longest = 1u64;
    let mut run = 1u64;
    for w in dates.windows(2) {
        if w[1] - w[0] == Duration::days(1) {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 1;
        }
    }
    longest
}

/// Best-effort natural-language bullets. Order is fixed so tests can assert
/// on position.
fn insights(
    sorted: &[&MoodLogEntry],
    hourly: &BTreeMap<u8, u64>,
    trend: &[TrendPoint],
    themes: &[ThemeCount],
    current_streak: u64,
    longest_streak: u64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut out = Vec::new();

    // Peak logging hour; smallest hour wins ties.
    if let Some((&peak_hour, _)) = hourly.iter().max_by_key(|(h, c)| (**c, std::cmp::Reverse(**h))) {
        let hour_12 = if peak_hour <= 12 { peak_hour } else { peak_hour - 12 };
        let am_pm = if peak_hour < 12 { "AM" } else { "PM" };
        out.push(format!(
            "You're most likely to log your mood around {hour_12}:00 {am_pm}"
        ));
    }

    let week_ago = now - Duration::days(7);
    let recent = sorted.iter().filter(|e| e.timestamp >= week_ago).count();
    if recent > 0 {
        out.push(format!(
            "You've logged {recent} moods in the past week. Great consistency!"
        ));
    }

    if let Some(top) = themes.first() {
        out.push(format!(
            "'{}' appears frequently in your mood logs. This might be a key theme to explore.",
            top.word
        ));
    }

    if current_streak >= 3 {
        out.push(format!(
            "You're on a {current_streak}-day logging streak! Keep it up!"
        ));
    } else if current_streak == 0 && longest_streak > 0 {
        out.push(format!(
            "Your longest streak was {longest_streak} days. You can beat that!"
        ));
    }

    if trend.len() >= 7 {
        let last7: u64 = trend[trend.len() - 7..].iter().map(|t| t.count).sum();
        let avg = last7 as f64 / 7.0;
        if avg > 1.0 {
            out.push(format!(
                "You're averaging {avg:.1} mood logs per day. Self-reflection is powerful!"
            ));
        }
    }

    out
}

//! Free-text duration extraction
//!
//! Finds the first cooking duration mentioned in an instruction, such as
//! "simmer for 10 minutes" or "蒸十五分鐘", and converts it to seconds.
//! The session consumes this through [`DurationExtractor`] so hosts can plug
//! in their own parser.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Number followed by a unit word
static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Numeric part is decimal digits or CJK numerals. Full unit words are
    // listed before their abbreviations so "minutes" never matches as "min".
    Regex::new(
        r"(?i)([0-9.]+|[零一二兩三四五六七八九十百半]+)\s*(minutes?|mins?|hours?|hrs?|seconds?|secs?|分鐘|分|小時|秒鐘|秒)",
    )
    .unwrap()
});

/// A duration found in free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundDuration {
    /// Length in seconds (always finite and positive)
    pub seconds: f64,
    /// The matched text, used as the timer label (e.g., "10 minutes")
    pub label: String,
}

/// Source of timer durations for the "start timer" voice command
pub trait DurationExtractor: Send + Sync {
    fn find_duration(&self, text: &str) -> Option<FoundDuration>;
}

impl<F> DurationExtractor for F
where
    F: Fn(&str) -> Option<FoundDuration> + Send + Sync,
{
    fn find_duration(&self, text: &str) -> Option<FoundDuration> {
        self(text)
    }
}

/// Default extractor backed by [`find_duration_in_text`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDurationExtractor;

impl DurationExtractor for TextDurationExtractor {
    fn find_duration(&self, text: &str) -> Option<FoundDuration> {
        find_duration_in_text(text)
    }
}

/// Find the first duration mentioned in `text`
///
/// Returns `None` when nothing matches or when the match does not amount to a
/// usable positive duration (e.g., "0 minutes" or a stray ".").
pub fn find_duration_in_text(text: &str) -> Option<FoundDuration> {
    let captures = DURATION_PATTERN.captures(text)?;
    let label = captures.get(0)?.as_str();
    let number = captures.get(1)?.as_str();
    let unit = captures.get(2)?.as_str();

    let seconds = parse_duration_to_seconds(number, unit)?;
    if !seconds.is_finite() || seconds <= 0.0 {
        tracing::debug!("Ignoring non-positive duration match {:?}", label);
        return None;
    }

    Some(FoundDuration {
        seconds,
        label: label.to_string(),
    })
}

/// Convert a number and a unit word into seconds
///
/// Unknown units yield `Some(0.0)`; an unparseable number yields `None`.
pub fn parse_duration_to_seconds(number: &str, unit: &str) -> Option<f64> {
    let value = parse_fuzzy_number(number)?;
    let unit = unit.to_lowercase();

    let multiplier = if unit.starts_with("min") || unit.contains('分') {
        60.0
    } else if unit.starts_with("hour") || unit.starts_with("hr") || unit.contains('小') {
        3600.0
    } else if unit.starts_with("sec") || unit.contains('秒') {
        1.0
    } else {
        0.0
    };

    Some(value * multiplier)
}

/// Parse decimal digits or a CJK numeral such as "二十五" or "半"
pub fn parse_fuzzy_number(raw: &str) -> Option<f64> {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return raw.parse::<f64>().ok();
    }
    if raw == "半" {
        return Some(0.5);
    }

    let mut total = 0u32;
    let mut current = 0u32;
    let mut seen = false;

    for c in raw.chars() {
        let Some(value) = cjk_digit(c) else {
            continue;
        };
        seen = true;
        if value == 10 || value == 100 {
            if current == 0 {
                current = 1;
            }
            total += current * value;
            current = 0;
        } else {
            current = value;
        }
    }

    seen.then(|| f64::from(total + current))
}

fn cjk_digit(c: char) -> Option<u32> {
    let value = match c {
        '零' => 0,
        '一' => 1,
        '二' | '兩' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        '十' => 10,
        '百' => 100,
        _ => return None,
    };
    Some(value)
}

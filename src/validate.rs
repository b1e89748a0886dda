//! Input validation for wizard stages
//!
//! Each wizard stage accepts a narrow grammar; everything else is rejected
//! and the user is asked again. Parsing and validation happen together so a
//! handler gets either a typed value or nothing.

use crate::config::WATER_LITERS_PER_KG;
use once_cell::sync::Lazy;
use regex::Regex;

/// Positive decimal with an optional unit suffix, e.g. "70", "70.5 kg"
static WEIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)(?:\s?(?:kg|кг))?$").unwrap());

/// Letter-led word or phrase of letters, spaces and hyphens
static CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\p{L}[\p{L}\- ]*$").unwrap());

/// Two HH:MM values separated by a dash, e.g. "08:00-23:00"
static TIME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)\s*-\s*([01]\d|2[0-3]):([0-5]\d)$").unwrap()
});

/// Volume in millilitres with an optional unit suffix, e.g. "250", "250 ml"
static VOLUME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)(?:\s?(?:ml|мл))?$").unwrap());

/// Parse a body weight in kilograms. Returns `None` for anything that is
/// not a positive decimal (unit suffix allowed).
pub fn parse_weight(text: &str) -> Option<f64> {
    let caps = WEIGHT_RE.captures(text.trim())?;
    let weight: f64 = caps.get(1)?.as_str().parse().ok()?;
    if weight > 0.0 {
        Some(weight)
    } else {
        None
    }
}

/// Parse a city name: letter-led, letters/spaces/hyphens only, length
/// within `[min_len, max_len]`. The first letter is uppercased.
pub fn parse_city(text: &str, min_len: usize, max_len: usize) -> Option<String> {
    let text = text.trim();
    let len = text.chars().count();
    if len < min_len || len > max_len {
        return None;
    }
    if !CITY_RE.is_match(text) {
        return None;
    }

    let mut chars = text.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Parse a wake/sleep window, e.g. "08:00-23:00" -> ("08:00", "23:00")
pub fn parse_time_range(text: &str) -> Option<(String, String)> {
    let caps = TIME_RANGE_RE.captures(text.trim())?;
    let wake = format!("{}:{}", &caps[1], &caps[2]);
    let sleep = format!("{}:{}", &caps[3], &caps[4]);
    Some((wake, sleep))
}

/// Parse a drink volume in millilitres (unit suffix allowed)
pub fn parse_volume(text: &str) -> Option<f64> {
    let caps = VOLUME_RE.captures(text.trim())?;
    let volume: f64 = caps.get(1)?.as_str().parse().ok()?;
    if volume > 0.0 {
        Some(volume)
    } else {
        None
    }
}

/// Daily water goal in litres: weight * 0.035, rounded up to two decimals.
///
/// The product is snapped to six decimals first so float noise (70 * 0.035
/// is slightly above 2.45 in f64) does not push the ceiling a cent up.
pub fn daily_goal(weight: f64) -> f64 {
    let centiliters = weight * WATER_LITERS_PER_KG * 100.0;
    let snapped = (centiliters * 1e6).round() / 1e6;
    snapped.ceil() / 100.0
}

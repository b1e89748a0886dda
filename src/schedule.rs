//! Reminder schedule generation
//!
//! A schedule is an ordered list of "HH:MM" strings derived from a profile's
//! wake/sleep window and daily goal. Regeneration is wholesale and
//! deterministic; snoozing mutates a single entry in place.

use crate::config::{FIRST_REMINDER_OFFSET_MINUTES, PORTION_ML, SNOOZE_MINUTES};
use crate::error::{Error, Result};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parse "HH:MM" into minutes since midnight
pub fn parse_hhmm(text: &str) -> Result<u32> {
    let (h, m) = text
        .split_once(':')
        .ok_or_else(|| Error::Parse(format!("Invalid time: {}", text)))?;
    let hours: u32 = h
        .parse()
        .map_err(|_| Error::Parse(format!("Invalid time: {}", text)))?;
    let minutes: u32 = m
        .parse()
        .map_err(|_| Error::Parse(format!("Invalid time: {}", text)))?;
    if hours > 23 || minutes > 59 {
        return Err(Error::Parse(format!("Invalid time: {}", text)));
    }
    Ok(hours * 60 + minutes)
}

/// Format minutes since midnight as "HH:MM", wrapping past midnight
pub fn format_hhmm(minutes: u32) -> String {
    let wrapped = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", wrapped / 60, wrapped % 60)
}

/// Generate reminder timestamps for one day.
///
/// The goal is split into 200 ml portions; reminders start one hour after
/// waking and are spread evenly until sleep, treating `sleep <= start` as
/// crossing midnight. When the goal is large relative to the window the
/// interval floors to zero and timestamps collapse onto the start time;
/// that is a documented limitation, not an error.
pub fn generate(wake: &str, sleep: &str, goal_liters: f64) -> Result<Vec<String>> {
    let wake_min = parse_hhmm(wake)?;
    let sleep_min = parse_hhmm(sleep)?;

    // Portion count in integer millilitres to keep the ceiling exact
    let goal_ml = (goal_liters * 1000.0).round();
    if !goal_ml.is_finite() || goal_ml <= 0.0 {
        return Ok(Vec::new());
    }
    let portions = (goal_ml as u32).div_ceil(PORTION_ML);

    let start = (wake_min + FIRST_REMINDER_OFFSET_MINUTES) % MINUTES_PER_DAY;
    let span = if sleep_min <= start {
        sleep_min + MINUTES_PER_DAY - start
    } else {
        sleep_min - start
    };
    let interval = span / portions;

    Ok((0..portions)
        .map(|i| format_hhmm(start + i * interval))
        .collect())
}

/// Defer the single entry equal to `target` by seven minutes, carrying
/// minute/hour/day rollover. All other entries and the list order are
/// untouched; an absent target leaves the schedule unchanged.
pub fn snooze(schedule: &[String], target: &str) -> Result<Vec<String>> {
    let mut replaced = false;
    let mut updated = Vec::with_capacity(schedule.len());

    for entry in schedule {
        if !replaced && entry == target {
            let minutes = parse_hhmm(target)?;
            updated.push(format_hhmm(minutes + SNOOZE_MINUTES));
            replaced = true;
        } else {
            updated.push(entry.clone());
        }
    }

    Ok(updated)
}

/// The next reminder at or after `now` in clock order, else the earliest
/// entry (i.e. tomorrow's first reminder).
pub fn next_reminder(schedule: &[String], now: &str) -> Option<String> {
    let upcoming = schedule.iter().filter(|t| t.as_str() >= now).min();
    upcoming.or_else(|| schedule.iter().min()).cloned()
}

//! User-facing message text
//!
//! Single language; localization is out of scope. Kept in one place so the
//! wizard can re-issue any stage prompt by stage value.

use crate::profile::Profile;
use crate::session::{FlowMode, Stage};

pub const START: &str = "Hi! I can help you keep your water balance in check.\n\nTo work out your daily goal and turn on reminders, run /add_parameters.";

pub const HELP: &str = "Commands:\n\
    /add_parameters - enter your weight, city and waking hours\n\
    /edit_parameters - change previously entered parameters\n\
    /delete_parameters - erase everything I know about you\n\
    /info_parameters - show your stored parameters\n\
    /drink - log a drink\n\
    /time - when the next reminder is due\n\
    /stop - pause reminders\n\
    /continue - resume reminders";

pub const CANCELLED: &str = "Action cancelled.";
pub const GENERIC_ERROR: &str = "Something went wrong, please retry the command.";
pub const NO_PROFILE: &str = "I have no parameters for you yet. Run /add_parameters first.";

pub const DELETE_PROMPT: &str = "Type \"Delete\" to erase all your data.";
pub const DELETE_CONFIRM_WORD: &str = "Delete";
pub const DELETED: &str = "All your data has been removed.";

pub const STOP_PROMPT: &str = "Type \"Stop\" to pause reminders.";
pub const STOP_CONFIRM_WORD: &str = "Stop";
pub const STOPPED: &str = "Reminders paused. Use /continue to resume them.";
pub const CONTINUED: &str = "Reminders are back on.";

pub const DRINK_PROMPT: &str = "Time to drink some water! How much did you have?";
pub const DRINK_CHOICE_PROMPT: &str = "Type the amount you drank, in ml.";
pub const DRINK_ERROR: &str = "Please enter the volume as a number of millilitres.";
pub const SNOOZED: &str = "I'll remind you to drink water in 7 minutes.";

pub const CANCEL_BUTTON: &str = "Cancel";
pub const SKIP_BUTTON: &str = "Keep current value";
pub const SNOOZE_BUTTON: &str = "Remind me later";
pub const CHOICE_BUTTON: &str = "Custom amount";

/// The opening prompt for a wizard stage
pub fn stage_prompt(stage: Stage, mode: FlowMode) -> &'static str {
    match (stage, mode) {
        (Stage::Weight, FlowMode::Add) => {
            "Enter your body weight in kg so I can work out your daily water goal."
        }
        (Stage::Weight, FlowMode::Edit) => "Enter your new body weight.",
        (Stage::City, FlowMode::Add) => "Which city do you live in? I need it for your timezone.",
        (Stage::City, FlowMode::Edit) => "Enter your new city.",
        (Stage::Time, FlowMode::Add) => {
            "When do you wake up and go to sleep? Send it as HH:MM-HH:MM, e.g. 08:00-23:00."
        }
        (Stage::Time, FlowMode::Edit) => "Enter your new waking hours as HH:MM-HH:MM.",
        (Stage::Delete, _) => DELETE_PROMPT,
        (Stage::Stop, _) => STOP_PROMPT,
        (Stage::Drink, _) => DRINK_PROMPT,
        (Stage::DrinkChoice, _) => DRINK_CHOICE_PROMPT,
    }
}

/// The inline correction shown after invalid input for a stage
pub fn stage_correction(stage: Stage) -> &'static str {
    match stage {
        Stage::Weight => "Please enter a valid weight, e.g. 70 or 70.5 kg.",
        Stage::City => {
            "I couldn't recognise that city. Letters only, and it must be a real place."
        }
        Stage::Time => "Please send the window as HH:MM-HH:MM, e.g. 08:00-23:00.",
        Stage::Delete | Stage::Stop => "Please type the exact confirmation word.",
        Stage::Drink | Stage::DrinkChoice => DRINK_ERROR,
    }
}

pub fn commit_summary(profile: &Profile) -> String {
    format!(
        "All set! Weight: {} kg, city: {}, awake {}-{}.\nYour daily goal is {} litres - I'll remind you through the day.",
        profile.weight, profile.city, profile.time.0, profile.time.1, profile.goal
    )
}

pub fn profile_info(profile: &Profile) -> String {
    format!(
        "Weight: {} kg\nCity: {} ({})\nAwake: {}-{}\nDaily goal: {} l\nReminders: {}",
        profile.weight,
        profile.city,
        profile.timezone,
        profile.time.0,
        profile.time.1,
        profile.goal,
        if profile.mute { "paused" } else { "on" }
    )
}

pub fn drink_logged(volume: f64, total: f64) -> String {
    format!("Noted: {} ml. That's {} ml today.", volume, total)
}

pub fn next_reminder_at(time: Option<&str>) -> String {
    match time {
        Some(t) => format!("Next reminder at {}.", t),
        None => "No reminders scheduled. Run /add_parameters first.".to_string(),
    }
}

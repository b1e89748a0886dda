//! Configuration and domain constants

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Millilitres per reminder portion.
pub const PORTION_ML: u32 = 200;

/// Minutes a snoozed reminder is deferred by.
pub const SNOOZE_MINUTES: u32 = 7;

/// Litres of water per kilogram of body weight.
pub const WATER_LITERS_PER_KG: f64 = 0.035;

/// Minutes between waking up and the first reminder.
pub const FIRST_REMINDER_OFFSET_MINUTES: u32 = 60;

/// All configurable values for the daemon
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub geocode_api_key: String,
    pub timezonedb_api_key: String,
    pub profile_db: PathBuf,
    /// TTL for an in-flight wizard session; an expired session reads back
    /// as absent and the wizard cannot be resumed.
    pub session_ttl_secs: u64,
    pub city_min_len: usize,
    pub city_max_len: usize,
    pub poll_timeout_secs: u64,
    pub dispatch_interval_secs: u64,
}

impl Config {
    /// Build configuration from the environment (after `dotenvy::dotenv()`)
    pub fn from_env() -> Result<Self> {
        let require = |name: &str| -> Result<String> {
            std::env::var(name)
                .map_err(|_| Error::Config(format!("The {} variable is not set", name)))
        };

        Ok(Self {
            telegram_token: require("TELEGRAM_BOT_TOKEN")?,
            geocode_api_key: require("OPENCAGE_API_KEY")?,
            timezonedb_api_key: require("TIMEZONEDB_API_KEY")?,
            profile_db: std::env::var("HYDROMATE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hydromate.db")),
            session_ttl_secs: env_u64("SESSION_TTL_SECS", 6 * 3600),
            city_min_len: env_u64("CITY_MIN_LEN", 3) as usize,
            city_max_len: 49,
            poll_timeout_secs: 30,
            dispatch_interval_secs: 60,
        })
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            telegram_token: "test-token".to_string(),
            geocode_api_key: "test-key".to_string(),
            timezonedb_api_key: "test-key".to_string(),
            profile_db: temp_dir.join("hydromate.db"),
            session_ttl_secs: 6 * 3600,
            city_min_len: 3,
            city_max_len: 49,
            poll_timeout_secs: 1,
            dispatch_interval_secs: 60,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

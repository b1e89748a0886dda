//! Wizard session state and the session store contract
//!
//! A session is the per-user state of an in-flight wizard: the current
//! stage, whether the wizard was entered via add or edit, and the draft
//! profile accumulated so far. Sessions are persisted in a key-value store
//! with a TTL so a wizard survives process restarts but not abandonment.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Current step of a wizard. Absence of a session means no wizard is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Weight,
    City,
    Time,
    Delete,
    Stop,
    Drink,
    DrinkChoice,
}

/// How the parameters wizard was entered. Edit changes the prompts and
/// makes the terminal step update-and-merge instead of create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMode {
    Add,
    Edit,
}

/// Partially-filled profile under construction. Fields are filled
/// left-to-right by stage and never regress: a later stage's write never
/// clears an earlier field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub weight: Option<f64>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub time: Option<(String, String)>,
    pub goal: Option<f64>,
    #[serde(default)]
    pub mute: bool,
}

/// Per-user wizard state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub stage: Stage,
    pub mode: FlowMode,
    #[serde(default)]
    pub draft: Draft,
}

impl Session {
    pub fn new(stage: Stage, mode: FlowMode) -> Self {
        Self {
            stage,
            mode,
            draft: Draft::default(),
        }
    }
}

/// The two message ids a conversational turn may own: the stage prompt and
/// an optional inline error. The error slot is only set while the most
/// recent input was invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMessages {
    pub prompt: Option<i64>,
    pub error: Option<i64>,
}

impl TrackedMessages {
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.error.is_none()
    }
}

/// Per-user key-value storage for ephemeral bot state.
///
/// All state is partitioned by user id; writes are last-writer-wins. The
/// transport delivers at most one in-flight event per user, so no
/// optimistic locking is required.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, user: i64) -> Result<Option<Session>>;
    /// Persist a session with the store's TTL. An expired session reads
    /// back as absent and the wizard cannot be resumed.
    async fn put_session(&self, user: i64, session: &Session) -> Result<()>;
    async fn delete_session(&self, user: i64) -> Result<()>;

    async fn get_tracked(&self, user: i64) -> Result<TrackedMessages>;
    async fn put_tracked(&self, user: i64, tracked: TrackedMessages) -> Result<()>;
    /// Idempotent: clearing when nothing is tracked is a no-op.
    async fn clear_tracked(&self, user: i64) -> Result<()>;

    /// Membership flag for users with an open drink prompt; such users are
    /// not routed into other flows until the prompt is resolved. The flag
    /// carries the same TTL as a session so an abandoned prompt cannot
    /// block the user past expiry.
    async fn add_queued(&self, user: i64) -> Result<()>;
    async fn remove_queued(&self, user: i64) -> Result<()>;
    async fn is_queued(&self, user: i64) -> Result<bool>;

    async fn put_schedule(&self, user: i64, schedule: &[String]) -> Result<()>;
    async fn get_schedule(&self, user: i64) -> Result<Option<Vec<String>>>;
    async fn delete_schedule(&self, user: i64) -> Result<()>;

    /// Remember which schedule slot most recently fired for the user, so a
    /// snooze press knows which entry to defer.
    async fn set_pending_reminder(&self, user: i64, slot: &str) -> Result<()>;
    async fn take_pending_reminder(&self, user: i64) -> Result<Option<String>>;

    /// Accumulate logged drink volume; returns the new running total in ml.
    async fn add_drunk(&self, user: i64, ml: f64) -> Result<f64>;
    async fn get_drunk(&self, user: i64) -> Result<f64>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map(|at| Instant::now() < at).unwrap_or(true)
    }
}

/// In-memory session store with per-key TTL.
///
/// Keys are namespaced by purpose (`waiting-state:{user}`,
/// `tracked-messages:{user}`, `schedule:{user}`, ...) so a networked
/// key-value backend can slot behind the same trait without remapping.
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    session_ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            session_ttl,
        }
    }

    fn get_value(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.live() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put_value(&self, key: String, value: String, ttl: Option<Duration>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn remove_value(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

fn session_key(user: i64) -> String {
    format!("waiting-state:{}", user)
}

fn tracked_key(user: i64) -> String {
    format!("tracked-messages:{}", user)
}

fn queued_key(user: i64) -> String {
    format!("queued:{}", user)
}

fn schedule_key(user: i64) -> String {
    format!("schedule:{}", user)
}

fn pending_key(user: i64) -> String {
    format!("pending-reminder:{}", user)
}

fn drunk_key(user: i64) -> String {
    format!("drunk:{}", user)
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session(&self, user: i64) -> Result<Option<Session>> {
        match self.get_value(&session_key(user)) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_session(&self, user: i64, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.put_value(session_key(user), json, Some(self.session_ttl));
        Ok(())
    }

    async fn delete_session(&self, user: i64) -> Result<()> {
        self.remove_value(&session_key(user));
        Ok(())
    }

    async fn get_tracked(&self, user: i64) -> Result<TrackedMessages> {
        match self.get_value(&tracked_key(user)) {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(TrackedMessages::default()),
        }
    }

    async fn put_tracked(&self, user: i64, tracked: TrackedMessages) -> Result<()> {
        let json = serde_json::to_string(&tracked)?;
        self.put_value(tracked_key(user), json, Some(self.session_ttl));
        Ok(())
    }

    async fn clear_tracked(&self, user: i64) -> Result<()> {
        self.remove_value(&tracked_key(user));
        Ok(())
    }

    async fn add_queued(&self, user: i64) -> Result<()> {
        self.put_value(queued_key(user), "1".to_string(), Some(self.session_ttl));
        Ok(())
    }

    async fn remove_queued(&self, user: i64) -> Result<()> {
        self.remove_value(&queued_key(user));
        Ok(())
    }

    async fn is_queued(&self, user: i64) -> Result<bool> {
        Ok(self.get_value(&queued_key(user)).is_some())
    }

    async fn put_schedule(&self, user: i64, schedule: &[String]) -> Result<()> {
        let json = serde_json::to_string(schedule)?;
        self.put_value(schedule_key(user), json, None);
        Ok(())
    }

    async fn get_schedule(&self, user: i64) -> Result<Option<Vec<String>>> {
        match self.get_value(&schedule_key(user)) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete_schedule(&self, user: i64) -> Result<()> {
        self.remove_value(&schedule_key(user));
        Ok(())
    }

    async fn set_pending_reminder(&self, user: i64, slot: &str) -> Result<()> {
        self.put_value(pending_key(user), slot.to_string(), Some(self.session_ttl));
        Ok(())
    }

    async fn take_pending_reminder(&self, user: i64) -> Result<Option<String>> {
        let slot = self.get_value(&pending_key(user));
        self.remove_value(&pending_key(user));
        Ok(slot)
    }

    async fn add_drunk(&self, user: i64, ml: f64) -> Result<f64> {
        let total = self
            .get_value(&drunk_key(user))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
            + ml;
        self.put_value(drunk_key(user), total.to_string(), None);
        Ok(total)
    }

    async fn get_drunk(&self, user: i64) -> Result<f64> {
        Ok(self
            .get_value(&drunk_key(user))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0))
    }
}

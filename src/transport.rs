//! Chat transport contract
//!
//! The engine only needs "send text", "edit text by id", "delete by id" and
//! an inbound stream of text messages and button clicks. The concrete chat
//! protocol lives behind this trait (see `telegram.rs`).

use crate::error::Result;
use async_trait::async_trait;

/// Inbound event from the chat transport. The transport delivers at most
/// one in-flight event per user at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text {
        user: i64,
        message_id: i64,
        text: String,
    },
    Button {
        user: i64,
        message_id: i64,
        data: CallbackData,
    },
}

/// Button payloads the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackData {
    /// Abort the current wizard
    Cancel,
    /// Defer the current reminder
    Snooze,
    /// Quick-log a fixed volume in ml
    Drank(u32),
    /// Switch to free-text volume entry
    Choice,
    /// Keep the stored value for this stage (edit wizard only)
    Skip,
}

impl CallbackData {
    pub fn as_str(&self) -> String {
        match self {
            CallbackData::Cancel => "CANCEL".to_string(),
            CallbackData::Snooze => "SNOOZE".to_string(),
            CallbackData::Drank(ml) => format!("DRANK_{}", ml),
            CallbackData::Choice => "CHOICE".to_string(),
            CallbackData::Skip => "SKIP".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "CANCEL" => Some(CallbackData::Cancel),
            "SNOOZE" => Some(CallbackData::Snooze),
            "CHOICE" => Some(CallbackData::Choice),
            "SKIP" => Some(CallbackData::Skip),
            _ => data
                .strip_prefix("DRANK_")
                .and_then(|ml| ml.parse().ok())
                .map(CallbackData::Drank),
        }
    }
}

/// Inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: CallbackData,
}

impl Button {
    pub fn new(text: &str, data: CallbackData) -> Self {
        Self {
            text: text.to_string(),
            data,
        }
    }
}

/// Inline keyboard attached to an outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// Outgoing side of the chat transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message, returning its id so it can be tracked.
    async fn send_text(&self, user: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i64>;

    /// Edit a previously sent message in place.
    async fn edit_text(&self, user: i64, message_id: i64, text: &str) -> Result<()>;

    /// Delete a previously sent message.
    async fn delete_message(&self, user: i64, message_id: i64) -> Result<()>;
}

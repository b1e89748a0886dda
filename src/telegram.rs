//! Telegram Bot API adapter
//!
//! Minimal client over the HTTP Bot API: sendMessage, editMessageText,
//! deleteMessage and a getUpdates long-poll mapped onto [`Event`]s.

use crate::error::{Error, Result};
use crate::transport::{CallbackData, Event, Keyboard, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<InlineButton>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineButton {
                    text: b.text.clone(),
                    callback_data: b.data.as_str(),
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Bot API client; one instance per bot token
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{}", token),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response: ApiResponse<T> = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(Error::Transport(format!(
                "{} failed: {}",
                method,
                response.description.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        response
            .result
            .ok_or_else(|| Error::Transport(format!("{} returned no result", method)))
    }

    /// Long-poll for updates past `offset`. Returns the mapped events and
    /// the next offset to poll with.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<(Vec<Event>, i64)> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({ "offset": offset, "timeout": timeout_secs }),
            )
            .await?;

        let mut events = Vec::new();
        let mut next_offset = offset;

        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);

            if let Some(message) = update.message {
                if let Some(text) = message.text {
                    events.push(Event::Text {
                        user: message.chat.id,
                        message_id: message.message_id,
                        text,
                    });
                }
                continue;
            }

            if let Some(query) = update.callback_query {
                // Ack so the client stops its spinner; outcome is cosmetic
                let ack: std::result::Result<bool, _> = self
                    .call("answerCallbackQuery", json!({ "callback_query_id": query.id }))
                    .await;
                if let Err(e) = ack {
                    debug!("answerCallbackQuery failed: {}", e);
                }

                let (user, message_id) = match query.message {
                    Some(m) => (m.chat.id, m.message_id),
                    None => continue,
                };
                match query.data.as_deref().and_then(CallbackData::parse) {
                    Some(data) => events.push(Event::Button {
                        user,
                        message_id,
                        data,
                    }),
                    None => warn!("Unknown callback data from user {}", user),
                }
            }
        }

        Ok((events, next_offset))
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, user: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i64> {
        let mut body = json!({ "chat_id": user, "text": text });
        if let Some(kb) = keyboard {
            body["reply_markup"] = reply_markup(kb);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_text(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": user, "message_id": message_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, user: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": user, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }
}

//! Telegram channel: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation of `ChatTransport`. Text
//! messages and inline button presses are both surfaced as `InboundUpdate`s.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channels::{
    ChatId, ChatTransport, Controls, InboundUpdate, MessageId, OutgoingMessage, ParseMode, Sender,
    UpdatePayload, UpdateStream,
};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout: Duration,
    client: reqwest::Client,
    /// Offset just past the last update handed to the consumer.
    delivered: Arc<AtomicI64>,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            poll_timeout: Duration::from_secs(30),
            client: reqwest::Client::new(),
            delivered: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        api_url(self.bot_token.expose_secret(), method)
    }

    /// Verify the token by calling getMe; returns the bot's username.
    pub async fn health_check(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let data: Value = resp.json().await.map_err(|e| ChannelError::StartupFailed {
            name: CHANNEL_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(data
            .pointer("/result/username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Start long-polling. Updates from users outside the allowlist are dropped.
    pub fn start(&self) -> UpdateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();
        let timeout_secs = self.poll_timeout.as_secs();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                };

                for raw in results {
                    let Some(uid) = raw.get("update_id").and_then(Value::as_i64) else {
                        continue;
                    };
                    offset = uid + 1;

                    let Some(update) = parse_update(raw) else {
                        continue;
                    };

                    let user_id = update.sender.user_id.to_string();
                    let mut identities = vec![user_id.as_str()];
                    if let Some(ref username) = update.sender.username {
                        identities.push(username.as_str());
                    }
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            user_id = update.sender.user_id,
                            username = update.sender.username.as_deref().unwrap_or("unknown"),
                            "Telegram: ignoring update from unauthorized user"
                        );
                        continue;
                    }

                    if tx.send((uid, update)).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        delivered_stream(rx, self.delivered.clone())
    }

    /// Tell Telegram that every update taken from the stream so far is done
    /// with, so a restart does not fetch them again.
    pub async fn confirm_delivered(&self) -> Result<(), ChannelError> {
        let offset = self.delivered.load(Ordering::SeqCst);
        if offset == 0 {
            return Ok(());
        }
        let body = serde_json::json!({
            "offset": offset,
            "limit": 1,
            "timeout": 0,
            "allowed_updates": ["message", "callback_query"]
        });
        self.call("getUpdates", &body)
            .await
            .map_err(|e| ChannelError::PollFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;
        tracing::debug!(offset, "Confirmed Telegram updates");
        Ok(())
    }

    /// POST a Bot API method and unwrap the `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ApiFailure> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ApiFailure::Transport(format!("{status}: {e}")))?;

        if data.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(data.get("result").cloned().unwrap_or(Value::Null))
        } else {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description")
                .to_string();
            Err(ApiFailure::Rejected {
                status: status.as_u16(),
                description,
            })
        }
    }
}

/// Why a Bot API call failed.
#[derive(Debug, thiserror::Error)]
enum ApiFailure {
    /// Network or decoding problem.
    #[error("{0}")]
    Transport(String),
    /// Telegram answered with `ok: false`.
    #[error("{status}: {description}")]
    Rejected { status: u16, description: String },
}

// ── ChatTransport implementation ────────────────────────────────────

#[async_trait]
impl ChatTransport for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    /// Send with the requested parse mode, retrying as plain text if Telegram
    /// rejects the markup (user-supplied text can break Markdown entities).
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, ChannelError> {
        let body = send_message_body(chat_id, message);

        let result = match self.call("sendMessage", &body).await {
            Ok(result) => result,
            Err(ApiFailure::Rejected { status: 400, .. })
                if message.parse_mode != ParseMode::Plain =>
            {
                tracing::warn!(
                    chat_id,
                    "Telegram sendMessage with parse_mode failed; retrying without it"
                );
                let plain = message.clone().with_parse_mode(ParseMode::Plain);
                self.call("sendMessage", &send_message_body(chat_id, &plain))
                    .await
                    .map_err(|e| ChannelError::SendFailed {
                        name: CHANNEL_NAME.into(),
                        reason: e.to_string(),
                    })?
            }
            Err(e) => {
                return Err(ChannelError::SendFailed {
                    name: CHANNEL_NAME.into(),
                    reason: e.to_string(),
                });
            }
        };

        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::InvalidResponse {
                name: CHANNEL_NAME.into(),
                reason: "sendMessage result has no message_id".into(),
            })
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        self.call("deleteMessage", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::DeleteFailed {
                name: CHANNEL_NAME.into(),
                message_id,
                reason: e.to_string(),
            })
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "callback_query_id": callback_id,
            "show_alert": show_alert,
        });
        if let Some(text) = text {
            body["text"] = Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("answerCallbackQuery: {e}"),
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{token}/{method}")
}

/// Yield updates from the poll task, recording each one's offset as the
/// consumer takes it.
fn delivered_stream(
    rx: mpsc::UnboundedReceiver<(i64, InboundUpdate)>,
    delivered: Arc<AtomicI64>,
) -> UpdateStream {
    let stream = futures::stream::unfold((rx, delivered), |(mut rx, delivered)| async move {
        let (uid, update) = rx.recv().await?;
        delivered.fetch_max(uid + 1, Ordering::SeqCst);
        Some((update, (rx, delivered)))
    });
    Box::pin(stream)
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Build the JSON body for sendMessage.
fn send_message_body(chat_id: ChatId, message: &OutgoingMessage) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": message.text,
    });

    match message.parse_mode {
        ParseMode::Plain => {}
        ParseMode::Html => body["parse_mode"] = Value::from("HTML"),
        ParseMode::Markdown => body["parse_mode"] = Value::from("Markdown"),
    }

    match &message.controls {
        Controls::None => {}
        Controls::RemoveKeyboard => {
            body["reply_markup"] = serde_json::json!({ "remove_keyboard": true });
        }
        Controls::Inline(rows) => {
            let keyboard: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.token }))
                        .collect()
                })
                .collect();
            body["reply_markup"] = serde_json::json!({ "inline_keyboard": keyboard });
        }
    }

    body
}

fn parse_sender(from: &Value) -> Option<Sender> {
    Some(Sender {
        user_id: from.get("id").and_then(Value::as_i64)?,
        username: from
            .get("username")
            .and_then(Value::as_str)
            .map(String::from),
        first_name: from
            .get("first_name")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

/// Decode one raw getUpdates entry. Anything that is neither a text message
/// nor a callback query with data is skipped.
fn parse_update(update: &Value) -> Option<InboundUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
        let message_id = message.get("message_id").and_then(Value::as_i64)?;
        let sender = parse_sender(message.get("from")?)?;
        return Some(InboundUpdate {
            chat_id,
            sender,
            payload: UpdatePayload::Text {
                message_id,
                text: text.to_string(),
            },
        });
    }

    let query = update.get("callback_query")?;
    let callback_id = query.get("id").and_then(Value::as_str)?;
    let data = query.get("data").and_then(Value::as_str)?;
    let sender = parse_sender(query.get("from")?)?;
    let message = query.get("message");
    let chat_id = message
        .and_then(|m| m.pointer("/chat/id"))
        .and_then(Value::as_i64)
        // Private chats share the user's id
        .unwrap_or(sender.user_id);
    let message_id = message
        .and_then(|m| m.get("message_id"))
        .and_then(Value::as_i64);

    Some(InboundUpdate {
        chat_id,
        sender,
        payload: UpdatePayload::Callback {
            callback_id: callback_id.to_string(),
            data: data.to_string(),
            message_id,
        },
    })
}

// ── Tests ───────────────────────────────────────────────────────────

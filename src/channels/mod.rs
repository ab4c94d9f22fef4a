//! Transport boundary: inbound updates and outbound send/delete primitives.
//!
//! The dialogue core only talks to a `ChatTransport`; the Telegram Bot API
//! implementation lives in `telegram`.

pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use telegram::TelegramChannel;

/// Platform chat identifier.
pub type ChatId = i64;
/// Platform user identifier.
pub type UserId = i64;
/// Platform message identifier (scoped to a chat).
pub type MessageId = i64;

/// Stream of inbound updates produced by a running channel.
pub type UpdateStream = Pin<Box<dyn Stream<Item = InboundUpdate> + Send>>;

/// Identity of one conversation: a user talking to the bot in one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl ConversationKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

/// Who sent an inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// What arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePayload {
    /// A plain text message (commands included).
    Text { message_id: MessageId, text: String },
    /// An inline button press.
    Callback {
        callback_id: String,
        data: String,
        /// The bot message carrying the pressed button, if still known.
        message_id: Option<MessageId>,
    },
}

/// One inbound event from the transport, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub chat_id: ChatId,
    pub sender: Sender,
    pub payload: UpdatePayload,
}

impl InboundUpdate {
    pub fn text(chat_id: ChatId, user_id: UserId, message_id: MessageId, text: &str) -> Self {
        Self {
            chat_id,
            sender: Sender {
                user_id,
                username: None,
                first_name: None,
            },
            payload: UpdatePayload::Text {
                message_id,
                text: text.to_string(),
            },
        }
    }

    pub fn callback(chat_id: ChatId, user_id: UserId, callback_id: &str, data: &str) -> Self {
        Self {
            chat_id,
            sender: Sender {
                user_id,
                username: None,
                first_name: None,
            },
            payload: UpdatePayload::Callback {
                callback_id: callback_id.to_string(),
                data: data.to_string(),
                message_id: None,
            },
        }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(self.chat_id, self.sender.user_id)
    }

    /// The user's own message, if this update is one.
    pub fn user_message_id(&self) -> Option<MessageId> {
        match &self.payload {
            UpdatePayload::Text { message_id, .. } => Some(*message_id),
            UpdatePayload::Callback { .. } => None,
        }
    }

    /// Callback id to acknowledge, if this update is a button press.
    pub fn callback_id(&self) -> Option<&str> {
        match &self.payload {
            UpdatePayload::Callback { callback_id, .. } => Some(callback_id),
            UpdatePayload::Text { .. } => None,
        }
    }
}

/// How the platform should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Plain,
    Html,
    Markdown,
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Interactive controls attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Controls {
    None,
    /// Inline buttons, row by row.
    Inline(Vec<Vec<Button>>),
    /// Hide any custom reply keyboard the client still shows.
    RemoveKeyboard,
}

/// A renderable outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: ParseMode,
    pub controls: Controls,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Plain,
            controls: Controls::None,
        }
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    pub fn with_controls(mut self, controls: Controls) -> Self {
        self.controls = controls;
        self
    }
}

/// Outbound primitives the dialogue core needs from a chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Send a message, returning its platform id.
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, ChannelError>;

    /// Delete a message. Already-gone messages surface as errors too.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId)
    -> Result<(), ChannelError>;

    /// Acknowledge a button press, optionally with a toast or modal alert.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), ChannelError>;
}

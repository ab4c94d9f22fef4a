//! Inbound events: decoded once from raw transport updates.
//!
//! Button tokens and commands are matched here and nowhere else; the
//! transition table only ever sees typed variants.

use crate::channels::{InboundUpdate, UpdatePayload};

use super::screens::{FORMATS, SERVICES};

/// Callback tokens carried by the inline buttons.
pub mod tokens {
    pub const CONTINUE: &str = "continue_to_start";
    pub const NAME_YES: &str = "confirm_name_yes";
    pub const NAME_NO: &str = "confirm_name_no";
    pub const SERVICE_PREFIX: &str = "service_";
    pub const SERVICES_DONE: &str = "services_done";
    pub const FORMAT_PREFIX: &str = "format_";
    pub const SUBMIT: &str = "submit_order";
    pub const CANCEL: &str = "cancel_order";
}

/// A button press the form understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Continue,
    ConfirmName(bool),
    /// Index into the service catalog.
    ToggleService(usize),
    ServicesDone,
    /// Index into the format catalog.
    Format(usize),
    SubmitOrder,
    CancelOrder,
}

impl Choice {
    /// Parse a callback token. Out-of-range indices are rejected here.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            tokens::CONTINUE => Some(Self::Continue),
            tokens::NAME_YES => Some(Self::ConfirmName(true)),
            tokens::NAME_NO => Some(Self::ConfirmName(false)),
            tokens::SERVICES_DONE => Some(Self::ServicesDone),
            tokens::SUBMIT => Some(Self::SubmitOrder),
            tokens::CANCEL => Some(Self::CancelOrder),
            _ => parse_indexed(token, tokens::SERVICE_PREFIX, SERVICES.len())
                .map(Self::ToggleService)
                .or_else(|| {
                    parse_indexed(token, tokens::FORMAT_PREFIX, FORMATS.len()).map(Self::Format)
                }),
        }
    }

    /// The callback token for this choice.
    pub fn token(&self) -> String {
        match self {
            Self::Continue => tokens::CONTINUE.to_string(),
            Self::ConfirmName(true) => tokens::NAME_YES.to_string(),
            Self::ConfirmName(false) => tokens::NAME_NO.to_string(),
            Self::ToggleService(i) => format!("{}{i}", tokens::SERVICE_PREFIX),
            Self::ServicesDone => tokens::SERVICES_DONE.to_string(),
            Self::Format(i) => format!("{}{i}", tokens::FORMAT_PREFIX),
            Self::SubmitOrder => tokens::SUBMIT.to_string(),
            Self::CancelOrder => tokens::CANCEL.to_string(),
        }
    }
}

fn parse_indexed(token: &str, prefix: &str, len: usize) -> Option<usize> {
    let idx: usize = token.strip_prefix(prefix)?.parse().ok()?;
    (idx < len).then_some(idx)
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/start`: begin or resume.
    Entry,
    /// `/cancel`: abort from anywhere.
    Cancel,
    /// Free text that is not a command.
    Text(String),
    Choice(Choice),
    /// A command or token nothing handles.
    Unrecognized(String),
}

impl Event {
    /// Decode a raw transport update.
    pub fn from_update(update: &InboundUpdate) -> Self {
        match &update.payload {
            UpdatePayload::Text { text, .. } => Self::from_text(text),
            UpdatePayload::Callback { data, .. } => Choice::parse(data)
                .map(Self::Choice)
                .unwrap_or_else(|| Self::Unrecognized(data.clone())),
        }
    }

    /// Decode message text; commands may carry a `@botname` suffix.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Text(text.to_string());
        };

        let word = command.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("").to_lowercase();
        match name.as_str() {
            "start" => Self::Entry,
            "cancel" => Self::Cancel,
            _ => Self::Unrecognized(trimmed.to_string()),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Cancel => "cancel",
            Self::Text(_) => "text",
            Self::Choice(_) => "choice",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

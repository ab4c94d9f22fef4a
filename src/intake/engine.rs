//! Intake engine: checks a form record out, runs one transition and its side
//! effects, and checks the record back in.
//!
//! The engine does no locking of its own. The router guarantees that at most
//! one update per conversation is in here at a time.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::{ConversationKey, InboundUpdate, MessageId};
use crate::error::{DatabaseError, Result};
use crate::store::FormStore;

use super::dispatcher::SubmissionDispatcher;
use super::event::Event;
use super::machine::{self, Ignored, Outcome};
use super::screens;
use super::state::{ConversationState, Step};
use super::surface::ChatSurface;

/// What handling one update amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// A screen for `step` is (or should be) on display; the record is saved.
    Shown { step: Step },
    /// A button press was answered with an alert.
    Alerted,
    /// The form went out. `delivered` is false if the dispatcher failed.
    Submitted { delivered: bool },
    /// The conversation was cancelled.
    Ended,
    Ignored(Ignored),
}

pub struct IntakeEngine {
    store: Arc<dyn FormStore>,
    surface: ChatSurface,
    dispatcher: SubmissionDispatcher,
    delete_user_messages: bool,
}

impl IntakeEngine {
    pub fn new(
        store: Arc<dyn FormStore>,
        surface: ChatSurface,
        dispatcher: SubmissionDispatcher,
    ) -> Self {
        Self {
            store,
            surface,
            dispatcher,
            delete_user_messages: true,
        }
    }

    /// Whether the user's own text messages are removed along with the screen
    /// they answered.
    pub fn with_delete_user_messages(mut self, enabled: bool) -> Self {
        self.delete_user_messages = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn FormStore> {
        &self.store
    }

    /// Process one inbound update to completion.
    ///
    /// Transport failures are logged and swallowed. Only store failures are
    /// returned, in which case the record is left as it was before the call
    /// (or, for terminal outcomes, already removed).
    pub async fn handle(&self, update: &InboundUpdate) -> Result<Handled> {
        let key = update.key();
        let event = Event::from_update(update);
        let current = self.checkout(&key).await?;
        let step = current.as_ref().map(|s| s.step);

        let redelivered = match (&current, update.callback_id()) {
            (Some(state), Some(callback_id)) => state.already_applied(callback_id),
            _ => false,
        };
        let outcome = if redelivered {
            Outcome::Ignore(Ignored::Duplicate)
        } else {
            machine::transition(current, &event)
        };

        self.acknowledge(update, &outcome).await;

        match outcome {
            Outcome::Show {
                mut state,
                remove_user_message,
            } => {
                let trigger = if remove_user_message && self.delete_user_messages {
                    update.user_message_id()
                } else {
                    None
                };
                if let Some(callback_id) = update.callback_id() {
                    state.last_callback_id = Some(callback_id.to_string());
                }
                let screen = screens::render(&state);
                if let Err(e) = self
                    .surface
                    .show(key.chat_id, &screen, &mut state.visible_message_ids, trigger)
                    .await
                {
                    warn!(%key, step = %state.step, "Failed to show screen: {e}");
                }
                self.store.save_form(&key, &state).await?;
                debug!(%key, from = ?step, to = %state.step, event = event.kind(), "Advanced");
                Ok(Handled::Shown { step: state.step })
            }

            Outcome::Alert { text } => {
                debug!(%key, alert = text, "Alerted");
                Ok(Handled::Alerted)
            }

            Outcome::Submit {
                submission,
                mut visible,
            } => {
                // Gone before dispatch: a redelivered submit finds nothing.
                self.store.clear_form(&key).await?;

                match self.dispatcher.dispatch(key, &submission, &mut visible).await {
                    Ok(receipt) => {
                        info!(%key, receipt, "Intake completed");
                        Ok(Handled::Submitted { delivered: true })
                    }
                    Err(e) => {
                        error!(%key, receipt = ?e.delivered_receipt(), "Dispatch failed: {e}");
                        self.apologize(&key, &mut visible).await;
                        Ok(Handled::Submitted { delivered: false })
                    }
                }
            }

            Outcome::End {
                notice,
                mut visible,
            } => {
                let existed = self.store.clear_form(&key).await?;
                if let Err(e) = self.surface.show(key.chat_id, &notice, &mut visible, None).await {
                    warn!(%key, "Failed to show cancellation notice: {e}");
                }
                info!(%key, existed, "Intake cancelled");
                Ok(Handled::Ended)
            }

            Outcome::Ignore(reason) => {
                debug!(%key, step = ?step, event = event.kind(), %reason, "Discarded event");
                Ok(Handled::Ignored(reason))
            }
        }
    }

    /// Load the record for `key`. A record that no longer decodes is dropped
    /// so the user can start over.
    async fn checkout(&self, key: &ConversationKey) -> Result<Option<ConversationState>> {
        match self.store.load_form(key).await {
            Ok(state) => Ok(state),
            Err(DatabaseError::Serialization(reason)) => {
                warn!(%key, "Dropping undecodable intake form: {reason}");
                self.store.clear_form(key).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn acknowledge(&self, update: &InboundUpdate, outcome: &Outcome) {
        let Some(callback_id) = update.callback_id() else {
            return;
        };
        let alert = match outcome {
            Outcome::Alert { text } => Some(*text),
            _ => None,
        };
        if let Err(e) = self
            .surface
            .transport()
            .answer_callback(callback_id, alert, alert.is_some())
            .await
        {
            warn!(chat_id = update.chat_id, "Failed to answer callback: {e}");
        }
    }

    async fn apologize(&self, key: &ConversationKey, visible: &mut Vec<MessageId>) {
        if let Err(e) = self
            .surface
            .show(key.chat_id, &screens::dispatch_failed(), visible, None)
            .await
        {
            warn!(%key, "Failed to deliver apology: {e}");
        }
    }
}

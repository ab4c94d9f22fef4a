//! Pure transition table for the intake form.
//!
//! `transition` takes the checked-out record (if any) and a decoded event and
//! says what should happen. It performs no I/O; the engine carries out the
//! outcome, so the same table drives fresh runs, resumption and tests.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::MessageId;

use super::event::{Choice, Event};
use super::screens::{self, EMPTY_SELECTION_ALERT, FORMATS, SERVICES, Screen};
use super::state::{CompletedSubmission, ConversationState, Step};

/// Minimum number of characters a name needs to skip confirmation.
pub const MIN_NAME_CHARS: usize = 3;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Zа-яА-ЯёЁ\s\-]+$").expect("name pattern is valid")
});

/// Whether a name can be accepted without asking the user to confirm it.
pub fn is_plausible_name(input: &str) -> bool {
    input.chars().count() >= MIN_NAME_CHARS && NAME_PATTERN.is_match(input)
}

/// Why an event was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// No record exists and the event is not `/start` or `/cancel`.
    NoConversation,
    /// The event is not legal for the current step.
    NotExpected { step: Step },
    /// Unknown command or callback token.
    Unrecognized,
    /// Submit pressed but a field is missing.
    Incomplete,
    /// The same button press was delivered again.
    Duplicate,
}

impl std::fmt::Display for Ignored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConversation => write!(f, "no active conversation"),
            Self::NotExpected { step } => write!(f, "not expected in {step}"),
            Self::Unrecognized => write!(f, "unrecognized"),
            Self::Incomplete => write!(f, "submission incomplete"),
            Self::Duplicate => write!(f, "already applied"),
        }
    }
}

/// What handling an event should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Save the record and show the screen for its current step.
    Show {
        state: ConversationState,
        /// The user's triggering message should be removed too.
        remove_user_message: bool,
    },
    /// Answer the button press with an alert; nothing else changes.
    Alert { text: &'static str },
    /// The form is confirmed: drop the record and dispatch.
    Submit {
        submission: CompletedSubmission,
        visible: Vec<MessageId>,
    },
    /// Drop the record and replace the screen with a notice.
    End {
        notice: Screen,
        visible: Vec<MessageId>,
    },
    /// Leave everything as it is.
    Ignore(Ignored),
}

impl Outcome {
    fn show(state: ConversationState) -> Self {
        Self::Show {
            state,
            remove_user_message: false,
        }
    }

    fn show_after_text(state: ConversationState) -> Self {
        Self::Show {
            state,
            remove_user_message: true,
        }
    }

    /// Whether the conversation record is gone after this outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submit { .. } | Self::End { .. })
    }
}

/// Apply `event` to the checked-out record.
pub fn transition(current: Option<ConversationState>, event: &Event) -> Outcome {
    match (current, event) {
        (current, Event::Cancel) => Outcome::End {
            notice: screens::dialog_aborted(),
            visible: current.map(|s| s.visible_message_ids).unwrap_or_default(),
        },

        // Resume: re-show whatever step the record is on
        (Some(state), Event::Entry) if state.in_conversation => Outcome::show_after_text(state),

        // Fresh start; stale data is dropped but the old screen is still cleaned up
        (current, Event::Entry) => Outcome::show(ConversationState {
            visible_message_ids: current.map(|s| s.visible_message_ids).unwrap_or_default(),
            ..ConversationState::default()
        }),

        (_, Event::Unrecognized(_)) => Outcome::Ignore(Ignored::Unrecognized),

        (None, _) => Outcome::Ignore(Ignored::NoConversation),

        (Some(state), event) => step_transition(state, event),
    }
}

fn step_transition(mut state: ConversationState, event: &Event) -> Outcome {
    let step = state.step;
    let not_expected = Outcome::Ignore(Ignored::NotExpected { step });

    match step {
        Step::AwaitingInstructionAck => match event {
            Event::Choice(Choice::Continue) => {
                state.in_conversation = true;
                advance(state, Step::AwaitingName, false)
            }
            _ => not_expected,
        },

        Step::AwaitingName => match event {
            Event::Text(input) if is_plausible_name(input) => {
                state.submission.name = Some(input.clone());
                state.name_retry = false;
                advance(state, Step::AwaitingServices, true)
            }
            Event::Text(input) => {
                state.pending_name = Some(input.clone());
                advance(state, Step::AwaitingNameConfirmation, true)
            }
            _ => not_expected,
        },

        Step::AwaitingNameConfirmation => match event {
            Event::Choice(Choice::ConfirmName(true)) => {
                let Some(name) = state.pending_name.take() else {
                    return not_expected;
                };
                state.submission.name = Some(name);
                state.name_retry = false;
                advance(state, Step::AwaitingServices, false)
            }
            Event::Choice(Choice::ConfirmName(false)) => {
                state.pending_name = None;
                state.name_retry = true;
                advance(state, Step::AwaitingName, false)
            }
            _ => not_expected,
        },

        Step::AwaitingServices => match event {
            Event::Choice(Choice::ToggleService(idx)) => match SERVICES.get(*idx) {
                Some(service) => {
                    state.toggle_service(service);
                    Outcome::show(state)
                }
                None => not_expected,
            },
            Event::Choice(Choice::ServicesDone) if state.selected_services.is_empty() => {
                Outcome::Alert {
                    text: EMPTY_SELECTION_ALERT,
                }
            }
            Event::Choice(Choice::ServicesDone) => {
                state.submission.services = Some(state.selected_services.clone());
                advance(state, Step::AwaitingFormat, false)
            }
            _ => not_expected,
        },

        Step::AwaitingFormat => match event {
            Event::Choice(Choice::Format(idx)) => match FORMATS.get(*idx) {
                Some(format) => {
                    state.submission.format = Some(format.to_string());
                    advance(state, Step::AwaitingContact, false)
                }
                None => not_expected,
            },
            _ => not_expected,
        },

        Step::AwaitingContact => match event {
            // Blank input: ask again
            Event::Text(input) if input.trim().is_empty() => Outcome::show_after_text(state),
            Event::Text(input) => {
                state.submission.contact = Some(input.clone());
                advance(state, Step::AwaitingOrderConfirmation, true)
            }
            _ => not_expected,
        },

        Step::AwaitingOrderConfirmation => match event {
            Event::Choice(Choice::SubmitOrder) => match state.submission.complete() {
                Some(submission) => Outcome::Submit {
                    submission,
                    visible: state.visible_message_ids,
                },
                None => Outcome::Ignore(Ignored::Incomplete),
            },
            Event::Choice(Choice::CancelOrder) => Outcome::End {
                notice: screens::order_cancelled(),
                visible: state.visible_message_ids,
            },
            _ => not_expected,
        },
    }
}

fn advance(mut state: ConversationState, target: Step, after_text: bool) -> Outcome {
    let from = state.step;
    if let Err(e) = state.advance_to(target) {
        tracing::warn!(%from, %target, "Refusing step change: {e}");
        return Outcome::Ignore(Ignored::NotExpected { step: from });
    }
    if after_text {
        Outcome::show_after_text(state)
    } else {
        Outcome::show(state)
    }
}

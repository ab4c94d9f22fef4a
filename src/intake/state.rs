//! Intake state machine data: which step a conversation is in and what it
//! has collected so far.

use serde::{Deserialize, Serialize};

use crate::channels::MessageId;

use super::screens::SERVICES;

fn catalog_rank(service: &str) -> usize {
    SERVICES
        .iter()
        .position(|s| *s == service)
        .unwrap_or(SERVICES.len())
}

/// The steps of the intake form.
///
/// Progresses linearly: AwaitingInstructionAck → AwaitingName →
/// (AwaitingNameConfirmation) → AwaitingServices → AwaitingFormat →
/// AwaitingContact → AwaitingOrderConfirmation. The terminal state is the
/// absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitingInstructionAck,
    AwaitingName,
    AwaitingNameConfirmation,
    AwaitingServices,
    AwaitingFormat,
    AwaitingContact,
    AwaitingOrderConfirmation,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::AwaitingInstructionAck,
        Step::AwaitingName,
        Step::AwaitingNameConfirmation,
        Step::AwaitingServices,
        Step::AwaitingFormat,
        Step::AwaitingContact,
        Step::AwaitingOrderConfirmation,
    ];

    /// Check if a transition from `self` to `target` is legal.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        matches!(
            (self, target),
            (AwaitingInstructionAck, AwaitingName)
                | (AwaitingName, AwaitingServices)
                | (AwaitingName, AwaitingNameConfirmation)
                | (AwaitingNameConfirmation, AwaitingServices)
                | (AwaitingNameConfirmation, AwaitingName)
                | (AwaitingServices, AwaitingServices)
                | (AwaitingServices, AwaitingFormat)
                | (AwaitingFormat, AwaitingContact)
                | (AwaitingContact, AwaitingContact)
                | (AwaitingContact, AwaitingOrderConfirmation)
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingInstructionAck => "awaiting_instruction_ack",
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingNameConfirmation => "awaiting_name_confirmation",
            Self::AwaitingServices => "awaiting_services",
            Self::AwaitingFormat => "awaiting_format",
            Self::AwaitingContact => "awaiting_contact",
            Self::AwaitingOrderConfirmation => "awaiting_order_confirmation",
        };
        write!(f, "{s}")
    }
}

/// Partially filled submission. A field is set once its step is passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Chosen services, in catalog order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl Submission {
    /// All four fields, if every one of them is populated.
    pub fn complete(&self) -> Option<CompletedSubmission> {
        Some(CompletedSubmission {
            name: self.name.clone()?,
            services: self.services.clone().filter(|s| !s.is_empty())?,
            format: self.format.clone()?,
            contact: self.contact.clone()?,
        })
    }

    /// Services joined for display, empty when not chosen yet.
    pub fn services_line(&self) -> String {
        self.services
            .as_deref()
            .map(|s| s.join(", "))
            .unwrap_or_default()
    }
}

/// A submission ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSubmission {
    pub name: String,
    pub services: Vec<String>,
    pub format: String,
    pub contact: String,
}

impl CompletedSubmission {
    /// Services joined with `", "`.
    pub fn services_line(&self) -> String {
        self.services.join(", ")
    }
}

/// Persisted per-conversation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: Step,
    /// Set once the user has acknowledged the instructions.
    pub in_conversation: bool,
    pub submission: Submission,
    /// Unconfirmed name candidate while in `AwaitingNameConfirmation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_name: Option<String>,
    /// The user rejected a name candidate; the name prompt asks again.
    #[serde(default)]
    pub name_retry: bool,
    /// Working selection while in `AwaitingServices`.
    #[serde(default)]
    pub selected_services: Vec<String>,
    /// Bot messages currently on screen for this conversation.
    #[serde(default)]
    pub visible_message_ids: Vec<MessageId>,
    /// Id of the last button press applied to this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_callback_id: Option<String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            step: Step::AwaitingInstructionAck,
            in_conversation: false,
            submission: Submission::default(),
            pending_name: None,
            name_retry: false,
            selected_services: Vec::new(),
            visible_message_ids: Vec::new(),
            last_callback_id: None,
        }
    }
}

impl ConversationState {
    /// Move to `target`, refusing transitions the step graph does not allow.
    pub fn advance_to(&mut self, target: Step) -> Result<(), String> {
        if !self.step.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.step, target));
        }
        self.step = target;
        Ok(())
    }

    /// Whether `callback_id` is the button press this record last applied.
    pub fn already_applied(&self, callback_id: &str) -> bool {
        self.last_callback_id.as_deref() == Some(callback_id)
    }

    /// Add the service if absent, remove it if present.
    ///
    /// The selection is kept in catalog order, so toggling twice always
    /// restores it exactly. Services outside the catalog go last.
    pub fn toggle_service(&mut self, service: &str) {
        if let Some(pos) = self.selected_services.iter().position(|s| s == service) {
            self.selected_services.remove(pos);
            return;
        }
        let rank = catalog_rank(service);
        let at = self
            .selected_services
            .iter()
            .position(|s| catalog_rank(s) > rank)
            .unwrap_or(self.selected_services.len());
        self.selected_services.insert(at, service.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use Step::*;
        let transitions = [
            (AwaitingInstructionAck, AwaitingName),
            (AwaitingName, AwaitingServices),
            (AwaitingName, AwaitingNameConfirmation),
            (AwaitingNameConfirmation, AwaitingServices),
            (AwaitingNameConfirmation, AwaitingName),
            (AwaitingServices, AwaitingServices),
            (AwaitingServices, AwaitingFormat),
            (AwaitingFormat, AwaitingContact),
            (AwaitingContact, AwaitingOrderConfirmation),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use Step::*;
        // Skip steps
        assert!(!AwaitingInstructionAck.can_transition_to(AwaitingServices));
        assert!(!AwaitingName.can_transition_to(AwaitingFormat));
        // Go backward
        assert!(!AwaitingFormat.can_transition_to(AwaitingServices));
        assert!(!AwaitingOrderConfirmation.can_transition_to(AwaitingContact));
        // Self-transition where nothing is re-rendered in place
        assert!(!AwaitingFormat.can_transition_to(AwaitingFormat));
    }

    #[test]
    fn display_matches_serde() {
        for step in Step::ALL {
            let display = format!("{step}");
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{display}\""), json, "mismatch for {step:?}");
        }
    }

    #[test]
    fn advance_rejects_illegal_target() {
        let mut state = ConversationState::default();
        assert!(state.advance_to(Step::AwaitingContact).is_err());
        assert_eq!(state.step, Step::AwaitingInstructionAck);
        state.advance_to(Step::AwaitingName).unwrap();
        assert_eq!(state.step, Step::AwaitingName);
    }

    #[test]
    fn toggle_twice_restores_selection_and_order() {
        let mut state = ConversationState::default();
        state.toggle_service(SERVICES[3]);
        state.toggle_service(SERVICES[0]);
        state.toggle_service(SERVICES[2]);
        let before = state.selected_services.clone();

        for service in SERVICES {
            state.toggle_service(service);
            state.toggle_service(service);
            assert_eq!(state.selected_services, before, "toggling {service} twice");
        }
    }

    #[test]
    fn selection_follows_catalog_order() {
        let mut state = ConversationState::default();
        state.toggle_service(SERVICES[2]);
        state.toggle_service(SERVICES[0]);
        assert_eq!(state.selected_services, vec![SERVICES[0], SERVICES[2]]);

        state.toggle_service("Свой вариант");
        state.toggle_service(SERVICES[1]);
        assert_eq!(
            state.selected_services,
            vec![SERVICES[0], SERVICES[1], SERVICES[2], "Свой вариант"]
        );
    }

    #[test]
    fn remembers_only_the_last_callback() {
        let mut state = ConversationState::default();
        assert!(!state.already_applied("cb1"));
        state.last_callback_id = Some("cb1".into());
        assert!(state.already_applied("cb1"));
        assert!(!state.already_applied("cb2"));
    }

    #[test]
    fn records_without_callback_id_still_decode() {
        let json = r#"{"step":"awaiting_services","in_conversation":true,"submission":{}}"#;
        let state: ConversationState = serde_json::from_str(json).unwrap();
        assert!(state.last_callback_id.is_none());
    }

    #[test]
    fn complete_requires_every_field() {
        let mut sub = Submission {
            name: Some("Anna".into()),
            services: Some(vec!["x".into(), "y".into()]),
            format: Some("f".into()),
            contact: None,
        };
        assert!(sub.complete().is_none());

        sub.contact = Some("+1".into());
        let done = sub.complete().unwrap();
        assert_eq!(done.services_line(), "x, y");

        sub.services = Some(vec![]);
        assert!(sub.complete().is_none());
    }

    #[test]
    fn state_serde_roundtrip_keeps_step_and_fields() {
        let state = ConversationState {
            step: Step::AwaitingFormat,
            in_conversation: true,
            submission: Submission {
                name: Some("Anna".into()),
                services: Some(vec!["Контент-план".into()]),
                ..Default::default()
            },
            selected_services: vec!["Контент-план".into()],
            visible_message_ids: vec![77],
            ..Default::default()
        };

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn unknown_step_fails_to_deserialize() {
        let raw = r#"{"step":"awaiting_payment","in_conversation":true,"submission":{}}"#;
        assert!(serde_json::from_str::<ConversationState>(raw).is_err());
    }

    #[test]
    fn sparse_record_fills_defaults() {
        let raw = r#"{"step":"awaiting_name","in_conversation":true,"submission":{}}"#;
        let parsed: ConversationState = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.step, Step::AwaitingName);
        assert!(parsed.visible_message_ids.is_empty());
        assert!(!parsed.name_retry);
    }
}

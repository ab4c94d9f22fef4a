//! `FormStore` trait: durable per-conversation form records.

use async_trait::async_trait;

use crate::channels::ConversationKey;
use crate::error::DatabaseError;
use crate::intake::ConversationState;

/// Backend-agnostic storage for in-progress intake forms.
///
/// At most one record exists per conversation key. Absence of a record means
/// the conversation is idle (never started, finished, or cancelled).
#[async_trait]
pub trait FormStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Fetch the record for a conversation, if any.
    ///
    /// A stored record that no longer decodes yields
    /// `DatabaseError::Serialization`.
    async fn load_form(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ConversationState>, DatabaseError>;

    /// Insert or replace the record for a conversation.
    async fn save_form(
        &self,
        key: &ConversationKey,
        state: &ConversationState,
    ) -> Result<(), DatabaseError>;

    /// Remove the record. Returns `true` if one existed.
    async fn clear_form(&self, key: &ConversationKey) -> Result<bool, DatabaseError>;

    /// Every decodable record, oldest update first.
    async fn active_forms(&self) -> Result<Vec<(ConversationKey, ConversationState)>, DatabaseError>;
}

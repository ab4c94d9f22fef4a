//! libSQL backend: async `FormStore` implementation.
//!
//! Supports local file and in-memory databases. Each record is the JSON
//! encoding of a `ConversationState`, with the step mirrored in its own column
//! for inspection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::channels::ConversationKey;
use crate::error::DatabaseError;
use crate::intake::ConversationState;
use crate::store::migrations;
use crate::store::traits::FormStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn decode_state(raw: &str) -> Result<ConversationState, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl FormStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn load_form(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<ConversationState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM intake_forms WHERE chat_id = ?1 AND user_id = ?2",
                params![key.chat_id, key.user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_form: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_form: {e}")))?;
                decode_state(&raw).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_form: {e}"))),
        }
    }

    async fn save_form(
        &self,
        key: &ConversationKey,
        state: &ConversationState,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let state_json =
            serde_json::to_string(state).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO intake_forms (chat_id, user_id, step, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (chat_id, user_id) DO UPDATE SET step = ?3, state = ?4, updated_at = ?5",
                params![key.chat_id, key.user_id, state.step.to_string(), state_json, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_form: {e}")))?;

        debug!(%key, step = %state.step, "Saved intake form");
        Ok(())
    }

    async fn clear_form(&self, key: &ConversationKey) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM intake_forms WHERE chat_id = ?1 AND user_id = ?2",
                params![key.chat_id, key.user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_form: {e}")))?;
        Ok(count > 0)
    }

    async fn active_forms(&self) -> Result<Vec<(ConversationKey, ConversationState)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT chat_id, user_id, state FROM intake_forms ORDER BY updated_at ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_forms: {e}")))?;

        let mut forms = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("active_forms: {e}")))?
        {
            let chat_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("active_forms: {e}")))?;
            let user_id: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("active_forms: {e}")))?;
            let raw: String = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("active_forms: {e}")))?;

            let key = ConversationKey::new(chat_id, user_id);
            match decode_state(&raw) {
                Ok(state) => forms.push((key, state)),
                Err(e) => warn!(%key, "Skipping undecodable intake form: {e}"),
            }
        }
        Ok(forms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{Step, Submission};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn key() -> ConversationKey {
        ConversationKey::new(-100, 42)
    }

    fn in_format_step() -> ConversationState {
        ConversationState {
            step: Step::AwaitingFormat,
            in_conversation: true,
            submission: Submission {
                name: Some("Anna".into()),
                services: Some(vec!["Контент-план".into()]),
                ..Default::default()
            },
            selected_services: vec!["Контент-план".into()],
            visible_message_ids: vec![501],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let db = test_db().await;
        assert!(db.load_form(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let db = test_db().await;
        let state = in_format_step();
        db.save_form(&key(), &state).await.unwrap();

        let loaded = db.load_form(&key()).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn save_overwrites_single_record() {
        let db = test_db().await;
        let mut state = in_format_step();
        db.save_form(&key(), &state).await.unwrap();

        state.step = Step::AwaitingContact;
        state.submission.format = Some("Только разбор".into());
        db.save_form(&key(), &state).await.unwrap();

        let forms = db.active_forms().await.unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].1.step, Step::AwaitingContact);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let db = test_db().await;
        let other = ConversationKey::new(-100, 43);
        db.save_form(&key(), &in_format_step()).await.unwrap();
        db.save_form(&other, &ConversationState::default()).await.unwrap();

        assert_eq!(
            db.load_form(&other).await.unwrap().unwrap().step,
            Step::AwaitingInstructionAck
        );
        assert_eq!(
            db.load_form(&key()).await.unwrap().unwrap().step,
            Step::AwaitingFormat
        );
    }

    #[tokio::test]
    async fn clear_reports_existence() {
        let db = test_db().await;
        db.save_form(&key(), &in_format_step()).await.unwrap();

        assert!(db.clear_form(&key()).await.unwrap());
        assert!(!db.clear_form(&key()).await.unwrap());
        assert!(db.load_form(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_serialization_error() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO intake_forms (chat_id, user_id, step, state, created_at, updated_at)
                 VALUES (?1, ?2, 'awaiting_payment', '{\"step\":\"awaiting_payment\"}', 'x', 'x')",
                params![key().chat_id, key().user_id],
            )
            .await
            .unwrap();

        let err = db.load_form(&key()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
        assert!(db.active_forms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forms.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.save_form(&key(), &in_format_step()).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.load_form(&key()).await.unwrap().unwrap();
        assert_eq!(loaded, in_format_step());
    }
}

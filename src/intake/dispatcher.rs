//! Submission dispatcher: delivers a confirmed form to the requester and the
//! operator.

use crate::channels::{ChatId, ConversationKey, MessageId};
use crate::error::DispatchError;

use super::screens;
use super::state::CompletedSubmission;
use super::surface::ChatSurface;

pub struct SubmissionDispatcher {
    surface: ChatSurface,
    operator: ChatId,
}

impl SubmissionDispatcher {
    pub fn new(surface: ChatSurface, operator: ChatId) -> Self {
        Self { surface, operator }
    }

    /// Replace the requester's preview with a receipt, then notify the
    /// operator. Returns the receipt's message id.
    ///
    /// Callers must invoke this once per confirmed submission; nothing here
    /// deduplicates.
    pub async fn dispatch(
        &self,
        requester: ConversationKey,
        submission: &CompletedSubmission,
        visible: &mut Vec<MessageId>,
    ) -> Result<MessageId, DispatchError> {
        let receipt = self
            .surface
            .show(requester.chat_id, &screens::receipt(submission), visible, None)
            .await
            .map_err(|source| DispatchError::Receipt { source })?;

        let notification = screens::operator_notification(submission, requester.user_id);
        self.surface
            .post(self.operator, &notification)
            .await
            .map_err(|source| DispatchError::Operator { receipt, source })?;

        tracing::info!(
            %requester,
            operator = self.operator,
            services = %submission.services_line(),
            "Submission dispatched"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{ChatTransport, OutgoingMessage, ParseMode};
    use crate::error::ChannelError;

    const OPERATOR: ChatId = 999;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(ChatId, OutgoingMessage)>>,
        offline_chat: Option<ChatId>,
    }

    #[async_trait]
    impl ChatTransport for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn send_message(
            &self,
            chat_id: ChatId,
            message: &OutgoingMessage,
        ) -> Result<MessageId, ChannelError> {
            if self.offline_chat == Some(chat_id) {
                return Err(ChannelError::SendFailed {
                    name: "recorder".into(),
                    reason: "chat not found".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat_id, message.clone()));
            Ok(sent.len() as MessageId)
        }

        async fn delete_message(&self, _: ChatId, _: MessageId) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn answer_callback(&self, _: &str, _: Option<&str>, _: bool) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn submission() -> CompletedSubmission {
        CompletedSubmission {
            name: "Anna".into(),
            services: vec!["Определение стратегии".into(), "Контент-план".into()],
            format: "+ Разбор и инструкции".into(),
            contact: "+1-555-0100".into(),
        }
    }

    fn dispatcher(rec: Arc<Recorder>) -> SubmissionDispatcher {
        SubmissionDispatcher::new(ChatSurface::new(rec), OPERATOR)
    }

    #[tokio::test]
    async fn delivers_receipt_then_operator_notification() {
        let rec = Arc::new(Recorder::default());
        let mut visible = vec![];
        let receipt = dispatcher(rec.clone())
            .dispatch(ConversationKey::new(10, 42), &submission(), &mut visible)
            .await
            .unwrap();

        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, 10);
        assert!(sent[0].1.text.contains("Определение стратегии, Контент-план"));
        assert_eq!(sent[1].0, OPERATOR);
        assert_eq!(sent[1].1.parse_mode, ParseMode::Markdown);
        assert!(sent[1].1.text.contains("tg://user?id=42"));
        assert_eq!(visible, vec![receipt]);
    }

    #[tokio::test]
    async fn operator_failure_reports_delivered_receipt() {
        let rec = Arc::new(Recorder {
            offline_chat: Some(OPERATOR),
            ..Default::default()
        });
        let mut visible = vec![];
        let err = dispatcher(rec)
            .dispatch(ConversationKey::new(10, 42), &submission(), &mut visible)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Operator { .. }));
        assert_eq!(err.delivered_receipt(), Some(1));
    }

    #[tokio::test]
    async fn receipt_failure_skips_operator() {
        let rec = Arc::new(Recorder {
            offline_chat: Some(10),
            ..Default::default()
        });
        let mut visible = vec![];
        let err = dispatcher(rec.clone())
            .dispatch(ConversationKey::new(10, 42), &submission(), &mut visible)
            .await
            .unwrap_err();

        assert!(err.delivered_receipt().is_none());
        assert!(rec.sent.lock().unwrap().is_empty());
    }
}

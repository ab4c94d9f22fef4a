//! Chat surface: keeps at most one bot screen visible per conversation.
//!
//! Deletions are best-effort. A message that is already gone, or too old for
//! the platform to delete, is logged and forgotten.

use std::sync::Arc;

use crate::channels::{ChatId, ChatTransport, MessageId};
use crate::error::ChannelError;

use super::screens::Screen;

/// Wraps a transport with the replace-the-screen discipline.
#[derive(Clone)]
pub struct ChatSurface {
    transport: Arc<dyn ChatTransport>,
}

impl ChatSurface {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Delete every tracked message (and the user's trigger message, if any),
    /// then send `screen` and make it the only tracked message.
    ///
    /// `visible` is emptied before the send so a failed send never leaves
    /// stale ids behind.
    pub async fn show(
        &self,
        chat_id: ChatId,
        screen: &Screen,
        visible: &mut Vec<MessageId>,
        trigger: Option<MessageId>,
    ) -> Result<MessageId, ChannelError> {
        self.retire(chat_id, visible).await;
        if let Some(message_id) = trigger {
            self.delete_quietly(chat_id, message_id).await;
        }

        let message_id = self.transport.send_message(chat_id, screen).await?;
        visible.push(message_id);
        Ok(message_id)
    }

    /// Delete every tracked message and forget them.
    pub async fn retire(&self, chat_id: ChatId, visible: &mut Vec<MessageId>) {
        for message_id in visible.drain(..) {
            self.delete_quietly(chat_id, message_id).await;
        }
    }

    /// Send a message that is not tracked, e.g. a notice that outlives the
    /// conversation.
    pub async fn post(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageId, ChannelError> {
        self.transport.send_message(chat_id, screen).await
    }

    pub async fn delete_quietly(&self, chat_id: ChatId, message_id: MessageId) {
        if let Err(e) = self.transport.delete_message(chat_id, message_id).await {
            tracing::warn!(chat_id, message_id, "Could not delete message: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::OutgoingMessage;

    #[derive(Default)]
    struct Recorder {
        next_id: Mutex<MessageId>,
        sent: Mutex<Vec<String>>,
        deleted: Mutex<Vec<MessageId>>,
        refuse_delete: Vec<MessageId>,
        refuse_send: bool,
    }

    #[async_trait]
    impl ChatTransport for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn send_message(
            &self,
            _chat_id: ChatId,
            message: &OutgoingMessage,
        ) -> Result<MessageId, ChannelError> {
            if self.refuse_send {
                return Err(ChannelError::SendFailed {
                    name: "recorder".into(),
                    reason: "offline".into(),
                });
            }
            self.sent.lock().unwrap().push(message.text.clone());
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            Ok(100 + *id)
        }

        async fn delete_message(
            &self,
            _chat_id: ChatId,
            message_id: MessageId,
        ) -> Result<(), ChannelError> {
            if self.refuse_delete.contains(&message_id) {
                return Err(ChannelError::DeleteFailed {
                    name: "recorder".into(),
                    message_id,
                    reason: "too old".into(),
                });
            }
            self.deleted.lock().unwrap().push(message_id);
            Ok(())
        }

        async fn answer_callback(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
            _show_alert: bool,
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn show_replaces_tracked_screen() {
        let rec = Arc::new(Recorder::default());
        let surface = ChatSurface::new(rec.clone());
        let mut visible = vec![7, 8];

        let id = surface
            .show(1, &OutgoingMessage::plain("next"), &mut visible, Some(9))
            .await
            .unwrap();

        assert_eq!(visible, vec![id]);
        assert_eq!(*rec.deleted.lock().unwrap(), vec![7, 8, 9]);
        assert_eq!(*rec.sent.lock().unwrap(), vec!["next"]);
    }

    #[tokio::test]
    async fn failed_deletes_do_not_block_the_send() {
        let rec = Arc::new(Recorder {
            refuse_delete: vec![7],
            ..Default::default()
        });
        let surface = ChatSurface::new(rec.clone());
        let mut visible = vec![7, 8];

        surface
            .show(1, &OutgoingMessage::plain("next"), &mut visible, None)
            .await
            .unwrap();

        assert_eq!(visible.len(), 1);
        assert_eq!(*rec.deleted.lock().unwrap(), vec![8]);
    }

    /// Collects formatted log lines for inspection.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn failed_delete_is_logged_as_warning() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let rec = Arc::new(Recorder {
            refuse_delete: vec![7],
            ..Default::default()
        });
        let surface = ChatSurface::new(rec);
        surface.delete_quietly(1, 7).await;

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains("chat_id=1"), "{out}");
        assert!(out.contains("message_id=7"), "{out}");
    }

    #[tokio::test]
    async fn failed_send_leaves_nothing_tracked() {
        let rec = Arc::new(Recorder {
            refuse_send: true,
            ..Default::default()
        });
        let surface = ChatSurface::new(rec.clone());
        let mut visible = vec![3];

        let result = surface
            .show(1, &OutgoingMessage::plain("x"), &mut visible, None)
            .await;
        assert!(result.is_err());
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn post_is_untracked() {
        let rec = Arc::new(Recorder::default());
        let surface = ChatSurface::new(rec.clone());
        surface.post(1, &OutgoingMessage::plain("bye")).await.unwrap();
        assert!(rec.deleted.lock().unwrap().is_empty());
    }
}

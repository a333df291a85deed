use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use tenderdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use tenderdesk_core::domain::chat::{chat_storage_key, ChatMessage};
use tenderdesk_core::domain::tender::TenderId;

use super::collection::{load_collection, store_collection};
use super::tender::DEFAULT_LATENCY;
use super::{KeyValueStore, RepositoryError};

/// Append-only chat transcripts, one storage key per tender.
pub struct ChatTranscripts {
    storage: Arc<dyn KeyValueStore>,
    latency: Duration,
    write_lock: Mutex<()>,
    audit: Arc<dyn AuditSink>,
    context: AuditContext,
}

impl ChatTranscripts {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            latency: DEFAULT_LATENCY,
            write_lock: Mutex::new(()),
            audit: Arc::new(NoopAuditSink),
            context: AuditContext::system(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    pub async fn load(&self, tender_id: &TenderId) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.pause().await;
        load_collection(self.storage.as_ref(), &chat_storage_key(tender_id)).await
    }

    pub async fn append(
        &self,
        tender_id: &TenderId,
        sender: &str,
        text: &str,
    ) -> Result<ChatMessage, RepositoryError> {
        let message = ChatMessage::new(sender, text, Utc::now())?;

        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let key = chat_storage_key(tender_id);
        let mut messages: Vec<ChatMessage> = load_collection(self.storage.as_ref(), &key).await?;
        messages.push(message.clone());
        store_collection(self.storage.as_ref(), &key, &messages).await?;

        tracing::info!(
            event_name = "chat.message_appended",
            correlation_id = %self.context.correlation_id,
            tender_id = %tender_id,
            sender = %message.sender,
            "chat message appended"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(tender_id.0.clone()),
                &self.context,
                "chat.message_appended",
                AuditCategory::Chat,
                AuditOutcome::Success,
            )
            .with_metadata("sender", message.sender.clone()),
        );

        Ok(message)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tenderdesk_core::domain::tender::TenderId;

    use super::ChatTranscripts;
    use crate::repositories::{InMemoryKeyValueStore, KeyValueStore, RepositoryError};

    #[tokio::test]
    async fn transcripts_are_appended_in_order_per_tender() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let chat = ChatTranscripts::new(storage.clone()).with_latency(Duration::ZERO);
        let first = TenderId("tender_1_a".to_owned());
        let second = TenderId("tender_2_b".to_owned());

        chat.append(&first, "user", "hello").await.expect("first");
        chat.append(&first, "provider-1", "hi there").await.expect("second");
        chat.append(&second, "user", "other thread").await.expect("third");

        let transcript = chat.load(&first).await.expect("load");
        let texts: Vec<&str> = transcript.iter().map(|message| message.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "hi there"]);
        assert_eq!(chat.load(&second).await.expect("load").len(), 1);
        assert!(storage.get("tender_chat_tender_1_a").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn blank_messages_are_not_stored() {
        let chat = ChatTranscripts::new(Arc::new(InMemoryKeyValueStore::default()))
            .with_latency(Duration::ZERO);
        let tender = TenderId("tender_1_a".to_owned());

        let error = chat.append(&tender, "user", "  ").await.expect_err("blank");
        assert!(matches!(error, RepositoryError::Domain(_)));
        assert!(chat.load(&tender).await.expect("load").is_empty());
    }
}

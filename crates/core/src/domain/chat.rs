use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tender::TenderId;
use crate::errors::DomainError;

pub const DEFAULT_CHAT_SENDER: &str = "user";

/// Storage key of a tender's chat transcript.
pub fn chat_storage_key(tender_id: &TenderId) -> String {
    format!("tender_chat_{}", tender_id.0)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        sender: impl Into<String>,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::InvariantViolation(
                "chat messages must contain text".to_owned(),
            ));
        }

        Ok(Self { sender: sender.into(), text: text.to_owned(), timestamp })
    }
}

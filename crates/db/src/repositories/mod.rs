use async_trait::async_trait;
use thiserror::Error;

use tenderdesk_core::attachment::AttachmentError;
use tenderdesk_core::errors::{ApplicationError, DomainError};

pub mod chat;
pub mod collection;
pub mod kv;
pub mod memory;
pub mod quote;
pub mod tender;

pub use chat::ChatTranscripts;
pub use kv::SqlKeyValueStore;
pub use memory::InMemoryKeyValueStore;
pub use quote::{ActionAvailability, QuoteStore};
pub use tender::{LaunchOutcome, TenderStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

impl RepositoryError {
    pub fn tender_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "tender", id: id.into() }
    }

    pub fn quote_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "quote", id: id.into() }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(
                error @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)),
            ) => Self::Upstream(error.to_string()),
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Encode(error) => Self::Persistence(error.to_string()),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Domain(error) => Self::Domain(error),
            RepositoryError::Attachment(AttachmentError::MissingAttachment) => {
                Self::MissingAttachment
            }
            RepositoryError::Attachment(error @ AttachmentError::InvalidName(_)) => {
                Self::Domain(DomainError::InvariantViolation(error.to_string()))
            }
            // Paths come from the operator, so a failed read or write is bad input.
            RepositoryError::Attachment(error @ AttachmentError::Io { .. }) => {
                Self::Domain(DomainError::AttachmentFile(error.to_string()))
            }
            RepositoryError::Attachment(error) => Self::Persistence(error.to_string()),
        }
    }
}

/// String-keyed storage holding JSON documents, the shape of a browser's local storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: String) -> Result<(), RepositoryError>;
    async fn remove(&self, key: &str) -> Result<(), RepositoryError>;
}

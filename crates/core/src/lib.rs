pub mod attachment;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use attachment::{Attachment, AttachmentError, DecodedAttachment};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::chat::ChatMessage;
pub use domain::quote::{
    CompletionDate, CompletionDateKind, NewQuote, Quote, QuoteId, QuoteItem, QuoteItemState,
};
pub use domain::tender::{
    NewTender, ProviderRef, ResponseDeadline, Tender, TenderCategory, TenderId, TenderPatch,
    TenderState,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{QuoteAction, QuoteFlow, TenderAction, TenderEvent, TenderFlow};

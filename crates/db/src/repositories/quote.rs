use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;

use tenderdesk_core::attachment::{download, Attachment, DecodedAttachment};
use tenderdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use tenderdesk_core::domain::identity::{generate_unique_id, next_timestamp};
use tenderdesk_core::domain::quote::{
    CompletionDate, CompletionDateKind, NewQuote, Quote, QuoteId, QuoteItem, QuoteItemId,
    QuoteItemState, QuoteNote,
};
use tenderdesk_core::errors::DomainError;
use tenderdesk_core::flows::{QuoteAction, QuoteFlow, QuoteTransition};

use super::collection::{load_collection, store_collection};
use super::tender::DEFAULT_LATENCY;
use super::{KeyValueStore, RepositoryError};

pub const QUOTES_KEY: &str = "quotes";
const ID_PREFIX: &str = "quote";

/// Whether an action can currently be taken on a quote, and why not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionAvailability {
    pub action: QuoteAction,
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Local stand-in for the quote management API. Every mutation is gated by
/// [`QuoteFlow`] before anything is written.
pub struct QuoteStore {
    storage: Arc<dyn KeyValueStore>,
    latency: Duration,
    flow: QuoteFlow,
    write_lock: Mutex<()>,
    audit: Arc<dyn AuditSink>,
    context: AuditContext,
}

impl QuoteStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            latency: DEFAULT_LATENCY,
            flow: QuoteFlow,
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

    pub async fn list(&self) -> Result<Vec<Quote>, RepositoryError> {
        self.pause().await;
        self.load().await
    }

    /// Quotes answering the given tender.
    pub async fn list_for_tender(&self, tender_id: &str) -> Result<Vec<Quote>, RepositoryError> {
        self.pause().await;
        let quotes = self.load().await?;
        Ok(quotes
            .into_iter()
            .filter(|quote| quote.external_id.as_deref() == Some(tender_id))
            .collect())
    }

    pub async fn get_by_id(&self, id: &QuoteId) -> Result<Quote, RepositoryError> {
        self.pause().await;
        self.load()
            .await?
            .into_iter()
            .find(|quote| &quote.id == id)
            .ok_or_else(|| RepositoryError::quote_not_found(id.0.clone()))
    }

    /// New quote with one pending item per entry of `item_prices` (at least one).
    pub async fn create(&self, data: NewQuote) -> Result<Quote, RepositoryError> {
        if data.item_prices.iter().flatten().any(|price| price.is_sign_negative()) {
            return Err(DomainError::InvariantViolation(
                "quote item prices cannot be negative".to_owned(),
            )
            .into());
        }

        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut quotes = self.load().await?;
        let id = generate_unique_id(ID_PREFIX, |candidate| {
            quotes.iter().any(|quote| quote.id.0 == candidate)
        });

        let prices: Vec<Option<Decimal>> =
            if data.item_prices.is_empty() { vec![None] } else { data.item_prices };
        let quote_item = prices
            .into_iter()
            .enumerate()
            .map(|(index, price)| QuoteItem {
                id: QuoteItemId(format!("{id}_item_{}", index + 1)),
                state: QuoteItemState::Pending,
                price,
                attachment: Vec::new(),
            })
            .collect();

        let now = Utc::now();
        let quote = Quote {
            id: QuoteId(id),
            external_id: data.external_id,
            description: data
                .description
                .map(|description| description.trim().to_owned())
                .filter(|description| !description.is_empty()),
            state: None,
            quote_item,
            note: Vec::new(),
            requested_quote_completion_date: None,
            expected_quote_completion_date: None,
            created_at: now,
            updated_at: now,
        };
        quotes.push(quote.clone());
        self.persist(&quotes).await?;

        tracing::info!(
            event_name = "quote.created",
            correlation_id = %self.context.correlation_id,
            quote_id = %quote.id,
            items = quote.quote_item.len(),
            "quote created"
        );
        self.record(&quote.id, "quote.created", AuditOutcome::Success, &[]);

        Ok(quote)
    }

    /// Applies a status-changing action (accept, submit, customer accept,
    /// reject, cancel).
    pub async fn apply_action(&self, id: &QuoteId, action: QuoteAction) -> Result<Quote, RepositoryError> {
        if action.target_state().is_none() {
            return Err(DomainError::InvariantViolation(format!(
                "{action} does not change quote state"
            ))
            .into());
        }

        self.mutate(id, action, |quote, transition| {
            if let Some(next) = transition.to {
                quote.set_state(next);
            }
            Ok(())
        })
        .await
    }

    /// Attaches a file to the quote's first item.
    pub async fn add_attachment(
        &self,
        id: &QuoteId,
        attachment: Attachment,
    ) -> Result<Quote, RepositoryError> {
        self.mutate(id, QuoteAction::AddAttachment, move |quote, _| {
            let item = quote.quote_item.first_mut().ok_or_else(|| {
                DomainError::InvariantViolation("quote has no items to attach to".to_owned())
            })?;
            item.attachment.push(attachment);
            Ok(())
        })
        .await
    }

    /// Decodes the most recently added attachment.
    pub async fn download_attachment(&self, id: &QuoteId) -> Result<DecodedAttachment, RepositoryError> {
        let quote = self.get_by_id(id).await?;
        self.flow.apply(&quote, QuoteAction::DownloadAttachment).map_err(DomainError::from)?;
        Ok(download(quote.latest_attachment())?)
    }

    pub async fn add_note(
        &self,
        id: &QuoteId,
        author: &str,
        text: &str,
    ) -> Result<Quote, RepositoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::InvariantViolation("notes must contain text".to_owned()).into());
        }
        let note = QuoteNote { author: author.to_owned(), text: text.to_owned(), date: Utc::now() };

        self.mutate(id, QuoteAction::AddNote, move |quote, _| {
            quote.note.push(note);
            Ok(())
        })
        .await
    }

    /// Sets the requested or expected completion date; it must fall after today.
    pub async fn set_completion_date(
        &self,
        id: &QuoteId,
        kind: CompletionDateKind,
        date: CompletionDate,
    ) -> Result<Quote, RepositoryError> {
        date.ensure_after(Utc::now().date_naive())?;
        let action = match kind {
            CompletionDateKind::Requested => QuoteAction::AddRequestedDate,
            CompletionDateKind::Expected => QuoteAction::AddExpectedDate,
        };

        self.mutate(id, action, move |quote, _| {
            quote.set_completion_date(kind, date);
            Ok(())
        })
        .await
    }

    /// Availability of every quote action, in display order.
    pub async fn actions(&self, id: &QuoteId) -> Result<Vec<ActionAvailability>, RepositoryError> {
        let quote = self.get_by_id(id).await?;
        Ok(QuoteAction::ALL
            .into_iter()
            .map(|action| ActionAvailability {
                action,
                disabled: self.flow.is_action_disabled(&quote, action),
                reason: self.flow.disabled_reason(&quote, action),
            })
            .collect())
    }

    /// Unknown ids are a no-op; returns whether a quote was removed.
    pub async fn delete(&self, id: &QuoteId) -> Result<bool, RepositoryError> {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut quotes = self.load().await?;
        let before = quotes.len();
        quotes.retain(|quote| &quote.id != id);
        if quotes.len() == before {
            return Ok(false);
        }
        self.persist(&quotes).await?;

        tracing::info!(
            event_name = "quote.deleted",
            correlation_id = %self.context.correlation_id,
            quote_id = %id,
            "quote deleted"
        );
        self.record(id, "quote.deleted", AuditOutcome::Success, &[]);
        Ok(true)
    }

    async fn mutate<F>(&self, id: &QuoteId, action: QuoteAction, change: F) -> Result<Quote, RepositoryError>
    where
        F: FnOnce(&mut Quote, &QuoteTransition) -> Result<(), RepositoryError>,
    {
        self.pause().await;
        let _guard = self.write_lock.lock().await;

        let mut quotes = self.load().await?;
        let index = quotes
            .iter()
            .position(|quote| &quote.id == id)
            .ok_or_else(|| RepositoryError::quote_not_found(id.0.clone()))?;

        let transition = match self.flow.apply(&quotes[index], action) {
            Ok(transition) => transition,
            Err(error) => {
                tracing::info!(
                    event_name = "quote.action_rejected",
                    correlation_id = %self.context.correlation_id,
                    quote_id = %id,
                    action = %action,
                    "quote action rejected"
                );
                self.record(id, "quote.action_rejected", AuditOutcome::Rejected, &[(
                    "action",
                    action.as_str().to_owned(),
                )]);
                return Err(DomainError::from(error).into());
            }
        };

        let quote = &mut quotes[index];
        change(quote, &transition)?;
        quote.updated_at = next_timestamp(quote.updated_at);
        let updated = quote.clone();
        self.persist(&quotes).await?;

        tracing::info!(
            event_name = "quote.updated",
            correlation_id = %self.context.correlation_id,
            quote_id = %id,
            action = %action,
            "quote updated"
        );
        let mut metadata = vec![("action", action.as_str().to_owned())];
        if let Some(to) = transition.to {
            metadata.push(("to", to.as_str().to_owned()));
        }
        self.record(id, "quote.updated", AuditOutcome::Success, &metadata);

        Ok(updated)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn load(&self) -> Result<Vec<Quote>, RepositoryError> {
        load_collection(self.storage.as_ref(), QUOTES_KEY).await
    }

    async fn persist(&self, quotes: &[Quote]) -> Result<(), RepositoryError> {
        store_collection(self.storage.as_ref(), QUOTES_KEY, quotes).await
    }

    fn record(&self, id: &QuoteId, event_type: &str, outcome: AuditOutcome, metadata: &[(&str, String)]) {
        let mut event = AuditEvent::new(
            Some(id.0.clone()),
            &self.context,
            event_type,
            AuditCategory::Quote,
            outcome,
        );
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }
}

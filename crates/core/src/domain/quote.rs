use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::attachment::Attachment;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuoteItemState {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
    Accepted,
}

impl QuoteItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "inprogress" | "in_progress" | "in-progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Accepted)
    }
}

impl fmt::Display for QuoteItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const COMPLETION_DATE_FORMAT: &str = "%d-%m-%Y";

/// Completion dates travel as `DD-MM-YYYY`, the format the quote API expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompletionDate(NaiveDate);

impl CompletionDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Accepts `DD-MM-YYYY` or ISO `YYYY-MM-DD`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        NaiveDate::parse_from_str(trimmed, COMPLETION_DATE_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
            .map(Self)
            .map_err(|_| DomainError::InvalidCompletionDate(raw.to_owned()))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn ensure_after(&self, today: NaiveDate) -> Result<(), DomainError> {
        if self.0 > today {
            Ok(())
        } else {
            Err(DomainError::CompletionDateNotInFuture { date: self.to_string() })
        }
    }
}

impl fmt::Display for CompletionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(COMPLETION_DATE_FORMAT))
    }
}

impl Serialize for CompletionDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompletionDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionDateKind {
    Requested,
    Expected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: QuoteItemId,
    pub state: QuoteItemState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub attachment: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteNote {
    pub author: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: QuoteId,
    /// Tender this quote answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Quote-level state; only consulted when no item carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<QuoteItemState>,
    #[serde(default)]
    pub quote_item: Vec<QuoteItem>,
    #[serde(default)]
    pub note: Vec<QuoteNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_quote_completion_date: Option<CompletionDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_quote_completion_date: Option<CompletionDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn primary_state(&self) -> Option<QuoteItemState> {
        self.quote_item.first().map(|item| item.state).or(self.state)
    }

    pub fn is_cancelled(&self) -> bool {
        self.has_state(QuoteItemState::Cancelled)
    }

    pub fn is_accepted(&self) -> bool {
        self.has_state(QuoteItemState::Accepted)
    }

    /// A quote is finalized once any item is accepted or cancelled.
    pub fn is_finalized(&self) -> bool {
        self.is_cancelled() || self.is_accepted()
    }

    pub fn has_attachment(&self) -> bool {
        self.quote_item.iter().any(|item| !item.attachment.is_empty())
    }

    /// Most recently added attachment across all items.
    pub fn latest_attachment(&self) -> Option<&Attachment> {
        self.quote_item.iter().rev().find_map(|item| item.attachment.last())
    }

    /// Moves every item (or the quote itself when it has none) to `next`.
    pub fn set_state(&mut self, next: QuoteItemState) {
        if self.quote_item.is_empty() {
            self.state = Some(next);
            return;
        }
        for item in &mut self.quote_item {
            item.state = next;
        }
    }

    pub fn set_completion_date(&mut self, kind: CompletionDateKind, date: CompletionDate) {
        match kind {
            CompletionDateKind::Requested => self.requested_quote_completion_date = Some(date),
            CompletionDateKind::Expected => self.expected_quote_completion_date = Some(date),
        }
    }

    fn has_state(&self, state: QuoteItemState) -> bool {
        self.quote_item.iter().any(|item| item.state == state) || self.state == Some(state)
    }
}

/// Creation payload for a quote answering a tender.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuote {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub item_prices: Vec<Option<Decimal>>,
}

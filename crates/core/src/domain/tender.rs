use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::attachment::Attachment;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenderId(pub String);

impl TenderId {
    /// Last eight characters, the form operators read ids in.
    pub fn short(&self) -> &str {
        let len = self.0.len();
        if len > 8 && self.0.is_char_boundary(len - 8) {
            &self.0[len - 8..]
        } else {
            &self.0
        }
    }
}

impl fmt::Display for TenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenderCategory {
    /// Top-level request created by a customer.
    Coordinator,
    /// Per-provider child fanned out from a coordinator tender.
    Tendering,
}

impl TenderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Tendering => "tendering",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Some(Self::Coordinator),
            "tendering" => Some(Self::Tendering),
            _ => None,
        }
    }
}

impl fmt::Display for TenderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TenderState {
    Draft,
    PreLaunched,
    Pending,
    Sent,
    Closed,
}

impl TenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PreLaunched => "pre-launched",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pre-launched" | "prelaunched" | "pre_launched" => Some(Self::PreLaunched),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for TenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEADLINE_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";
const DEADLINE_SECOND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Response deadline as entered in a `datetime-local` field (`2099-01-01T10:00`),
/// interpreted as UTC. RFC 3339 input is accepted and normalized to UTC. Sub-second
/// precision is dropped on parse so stored and in-memory values always agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseDeadline(NaiveDateTime);

impl ResponseDeadline {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        NaiveDateTime::parse_from_str(trimmed, DEADLINE_MINUTE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, DEADLINE_SECOND_FORMAT))
            .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|value| value.naive_utc()))
            .map(|value| Self(value.with_nanosecond(0).unwrap_or(value)))
            .map_err(|_| DomainError::InvalidDeadline(raw.to_owned()))
    }

    pub fn as_utc(&self) -> DateTime<Utc> {
        self.0.and_utc()
    }

    pub fn ensure_after(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.as_utc() > now {
            Ok(())
        } else {
            Err(DomainError::DeadlineNotInFuture { deadline: self.to_string() })
        }
    }
}

impl fmt::Display for ResponseDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = if self.0.second() == 0 && self.0.nanosecond() == 0 {
            DEADLINE_MINUTE_FORMAT
        } else {
            DEADLINE_SECOND_FORMAT
        };
        write!(f, "{}", self.0.format(format))
    }
}

impl FromStr for ResponseDeadline {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for ResponseDeadline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResponseDeadline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tender {
    pub id: TenderId,
    pub category: TenderCategory,
    pub state: TenderState,
    pub response_deadline: ResponseDeadline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub selected_providers: Vec<String>,
    #[serde(rename = "external_id", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<TenderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    pub fn from_new(id: TenderId, data: NewTender, now: DateTime<Utc>) -> Self {
        Self {
            id,
            category: data.category,
            state: data.state,
            response_deadline: data.response_deadline,
            tender_note: data.tender_note,
            attachment: data.attachment,
            selected_providers: dedup_providers(data.selected_providers),
            external_id: data.external_id,
            provider: data.provider,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_child_of(&self, parent: &TenderId) -> bool {
        self.external_id.as_ref() == Some(parent)
    }
}

/// Creation payload; everything except identity and timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTender {
    pub category: TenderCategory,
    pub state: TenderState,
    pub response_deadline: ResponseDeadline,
    #[serde(default)]
    pub tender_note: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub selected_providers: Vec<String>,
    #[serde(rename = "external_id", default)]
    pub external_id: Option<TenderId>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl NewTender {
    /// A customer-created draft addressed to `providers`.
    pub fn coordinator_draft(response_deadline: ResponseDeadline, providers: Vec<String>) -> Self {
        Self {
            category: TenderCategory::Coordinator,
            state: TenderState::Draft,
            response_deadline,
            tender_note: None,
            attachment: None,
            selected_providers: providers,
            external_id: None,
            provider: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.tender_note = Some(note.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_parent(mut self, parent: TenderId) -> Self {
        self.external_id = Some(parent);
        self
    }

    /// Field-level rules that need no view of the stored collection.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.response_deadline.ensure_after(now)?;
        validate_attachment(self.attachment.as_ref())?;

        if self.category == TenderCategory::Tendering && self.external_id.is_none() {
            return Err(DomainError::InvariantViolation(
                "tendering tenders must reference a parent through external_id".to_owned(),
            ));
        }

        let initial = match self.category {
            TenderCategory::Coordinator => TenderState::Draft,
            TenderCategory::Tendering => TenderState::Pending,
        };
        if self.state != initial {
            return Err(DomainError::InvariantViolation(format!(
                "{} tenders must be created in state {initial}, got {}",
                self.category, self.state
            )));
        }

        Ok(())
    }
}

/// Partial update. State is not patchable; it moves only through tender transitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderPatch {
    #[serde(default)]
    pub response_deadline: Option<ResponseDeadline>,
    #[serde(default)]
    pub tender_note: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub selected_providers: Option<Vec<String>>,
    #[serde(rename = "external_id", default)]
    pub external_id: Option<TenderId>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl TenderPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(deadline) = &self.response_deadline {
            deadline.ensure_after(now)?;
        }
        validate_attachment(self.attachment.as_ref())
    }

    /// Merges the given fields into `tender`; timestamps are the caller's concern.
    pub fn apply_to(self, tender: &mut Tender) {
        if let Some(response_deadline) = self.response_deadline {
            tender.response_deadline = response_deadline;
        }
        if let Some(tender_note) = self.tender_note {
            tender.tender_note = Some(tender_note);
        }
        if let Some(attachment) = self.attachment {
            tender.attachment = Some(attachment);
        }
        if let Some(selected_providers) = self.selected_providers {
            tender.selected_providers = dedup_providers(selected_providers);
        }
        if let Some(external_id) = self.external_id {
            tender.external_id = Some(external_id);
        }
        if let Some(provider) = self.provider {
            tender.provider = Some(provider);
        }
    }
}

/// Provider reference used when fanning a coordinator tender out to children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub id: String,
    pub name: String,
}

impl ProviderRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

fn validate_attachment(attachment: Option<&Attachment>) -> Result<(), DomainError> {
    match attachment {
        Some(attachment) if !attachment.is_pdf() => Err(DomainError::InvariantViolation(format!(
            "tender attachments must be PDF documents, got `{}`",
            attachment.mime_type
        ))),
        _ => Ok(()),
    }
}

fn dedup_providers(providers: Vec<String>) -> Vec<String> {
    let mut unique = Vec::with_capacity(providers.len());
    for provider in providers {
        if !unique.contains(&provider) {
            unique.push(provider);
        }
    }
    unique
}

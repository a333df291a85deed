use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteItemState;
use crate::domain::tender::TenderState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderEvent {
    /// Fan a coordinator draft out to its providers.
    Launch,
    /// Send a coordinator draft without per-provider children.
    Send,
    /// A provider answered its child tender.
    Respond,
    Close,
}

impl TenderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Send => "send",
            Self::Respond => "respond",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for TenderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderAction {
    Edit,
    ExpandChildren,
}

impl TenderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::ExpandChildren => "expandChildren",
        }
    }
}

impl fmt::Display for TenderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuoteAction {
    ViewDetails,
    Chat,
    AddNote,
    AddAttachment,
    DownloadAttachment,
    Cancel,
    /// Provider takes a pending request into work.
    Accept,
    /// Provider hands back a priced quotation.
    SubmitQuotation,
    /// Customer accepts an approved quotation.
    AcceptCustomer,
    Reject,
    AddRequestedDate,
    AddExpectedDate,
}

impl QuoteAction {
    pub const ALL: [QuoteAction; 12] = [
        Self::ViewDetails,
        Self::Chat,
        Self::AddNote,
        Self::AddAttachment,
        Self::DownloadAttachment,
        Self::Cancel,
        Self::Accept,
        Self::SubmitQuotation,
        Self::AcceptCustomer,
        Self::Reject,
        Self::AddRequestedDate,
        Self::AddExpectedDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewDetails => "viewDetails",
            Self::Chat => "chat",
            Self::AddNote => "addNote",
            Self::AddAttachment => "addAttachment",
            Self::DownloadAttachment => "downloadAttachment",
            Self::Cancel => "cancel",
            Self::Accept => "accept",
            Self::SubmitQuotation => "submitQuotation",
            Self::AcceptCustomer => "acceptCustomer",
            Self::Reject => "reject",
            Self::AddRequestedDate => "addRequestedDate",
            Self::AddExpectedDate => "addExpectedDate",
        }
    }

    /// State the quote lands in after the action, for status-changing actions.
    pub fn target_state(&self) -> Option<QuoteItemState> {
        match self {
            Self::Accept => Some(QuoteItemState::InProgress),
            Self::SubmitQuotation => Some(QuoteItemState::Approved),
            Self::AcceptCustomer => Some(QuoteItemState::Accepted),
            Self::Reject => Some(QuoteItemState::Rejected),
            Self::Cancel => Some(QuoteItemState::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderTransition {
    pub from: TenderState,
    pub to: TenderState,
    pub event: TenderEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTransition {
    pub from: Option<QuoteItemState>,
    pub to: Option<QuoteItemState>,
    pub action: QuoteAction,
}

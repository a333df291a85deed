use thiserror::Error;

use crate::domain::quote::{Quote, QuoteItemState};
use crate::domain::tender::{TenderCategory, TenderState};
use crate::flows::states::{QuoteAction, QuoteTransition, TenderAction, TenderEvent, TenderTransition};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{category} tender in state {state} does not accept event {event}")]
    InvalidTenderTransition { category: TenderCategory, state: TenderState, event: TenderEvent },
    #[error("action {action} is not permitted while {subject} is {state}")]
    ActionNotPermitted { subject: &'static str, action: String, state: String },
}

/// Tender lifecycle rules.
///
/// | from                        | event   | to           | category    |
/// |-----------------------------|---------|--------------|-------------|
/// | draft                       | launch  | pre-launched | coordinator |
/// | draft                       | send    | sent         | coordinator |
/// | pending                     | respond | sent         | tendering   |
/// | pre-launched, sent, pending | close   | closed       | any         |
///
/// Only draft tenders may be edited; children are only revealed for pre-launched ones.
#[derive(Clone, Debug, Default)]
pub struct TenderFlow;

impl TenderFlow {
    pub fn transition(
        &self,
        category: TenderCategory,
        current: TenderState,
        event: TenderEvent,
    ) -> Result<TenderTransition, FlowTransitionError> {
        use TenderCategory::{Coordinator, Tendering};
        use TenderEvent::{Close, Launch, Respond, Send};
        use TenderState::{Closed, Draft, Pending, PreLaunched, Sent};

        let to = match (category, current, event) {
            (Coordinator, Draft, Launch) => PreLaunched,
            (Coordinator, Draft, Send) => Sent,
            (Tendering, Pending, Respond) => Sent,
            (_, PreLaunched | Sent | Pending, Close) => Closed,
            _ => {
                return Err(FlowTransitionError::InvalidTenderTransition {
                    category,
                    state: current,
                    event,
                });
            }
        };

        Ok(TenderTransition { from: current, to, event })
    }

    pub fn permits(&self, action: TenderAction, state: TenderState) -> bool {
        match action {
            TenderAction::Edit => state == TenderState::Draft,
            TenderAction::ExpandChildren => state == TenderState::PreLaunched,
        }
    }

    pub fn ensure_permitted(
        &self,
        action: TenderAction,
        state: TenderState,
    ) -> Result<(), FlowTransitionError> {
        if self.permits(action, state) {
            return Ok(());
        }

        Err(FlowTransitionError::ActionNotPermitted {
            subject: "tender",
            action: action.as_str().to_owned(),
            state: state.as_str().to_owned(),
        })
    }
}

/// Quote action gating. Every quote mutation asks [`QuoteFlow::apply`] first.
///
/// | action                          | allowed states                         |
/// |---------------------------------|----------------------------------------|
/// | accept (provider)               | pending -> inProgress                  |
/// | submit quotation (provider)     | inProgress -> approved                 |
/// | accept (customer)               | approved -> accepted                   |
/// | cancel, add attachment          | any non-finalized state                |
/// | reject                          | any non-finalized state but rejected   |
/// | download attachment, view, chat | any state except cancelled             |
/// | add requested/expected date     | any state                              |
#[derive(Clone, Debug, Default)]
pub struct QuoteFlow;

impl QuoteFlow {
    pub fn is_action_disabled(&self, quote: &Quote, action: QuoteAction) -> bool {
        let cancelled = quote.is_cancelled();
        let finalized = quote.is_finalized();
        let primary = quote.primary_state();

        match action {
            QuoteAction::ViewDetails
            | QuoteAction::Chat
            | QuoteAction::AddNote
            | QuoteAction::DownloadAttachment => cancelled,
            QuoteAction::AddAttachment | QuoteAction::Cancel => finalized,
            QuoteAction::Accept => finalized || primary != Some(QuoteItemState::Pending),
            QuoteAction::SubmitQuotation => {
                finalized || primary != Some(QuoteItemState::InProgress)
            }
            QuoteAction::AcceptCustomer => finalized || primary != Some(QuoteItemState::Approved),
            QuoteAction::Reject => finalized || primary == Some(QuoteItemState::Rejected),
            QuoteAction::AddRequestedDate | QuoteAction::AddExpectedDate => false,
        }
    }

    /// Reason shown next to a disabled action.
    pub fn disabled_reason(&self, quote: &Quote, action: QuoteAction) -> Option<String> {
        if !self.is_action_disabled(quote, action) {
            return None;
        }

        let status = if quote.is_cancelled() {
            "cancelled"
        } else if quote.is_accepted() {
            "accepted"
        } else {
            quote.primary_state().map(|state| state.as_str()).unwrap_or("unknown")
        };
        Some(format!("Action disabled - quote is {status}"))
    }

    pub fn apply(
        &self,
        quote: &Quote,
        action: QuoteAction,
    ) -> Result<QuoteTransition, FlowTransitionError> {
        let from = quote.primary_state();
        if self.is_action_disabled(quote, action) {
            return Err(FlowTransitionError::ActionNotPermitted {
                subject: "quote",
                action: action.as_str().to_owned(),
                state: from.map(|state| state.as_str()).unwrap_or("unknown").to_owned(),
            });
        }

        Ok(QuoteTransition { from, to: action.target_state(), action })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::quote::{Quote, QuoteId, QuoteItem, QuoteItemId, QuoteItemState};
    use crate::domain::tender::{TenderCategory, TenderState};
    use crate::flows::engine::{FlowTransitionError, QuoteFlow, TenderFlow};
    use crate::flows::states::{QuoteAction, TenderAction, TenderEvent};

    fn quote(state: QuoteItemState) -> Quote {
        let now = Utc::now();
        Quote {
            id: QuoteId("quote_1_abc".to_owned()),
            external_id: Some("tender_1_abc".to_owned()),
            description: None,
            state: None,
            quote_item: vec![QuoteItem {
                id: QuoteItemId("item-1".to_owned()),
                state,
                price: None,
                attachment: Vec::new(),
            }],
            note: Vec::new(),
            requested_quote_completion_date: None,
            expected_quote_completion_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn coordinator_draft_launches_then_closes() {
        let flow = TenderFlow;
        let launched = flow
            .transition(TenderCategory::Coordinator, TenderState::Draft, TenderEvent::Launch)
            .expect("draft -> pre-launched");
        assert_eq!(launched.to, TenderState::PreLaunched);

        let closed = flow
            .transition(TenderCategory::Coordinator, launched.to, TenderEvent::Close)
            .expect("pre-launched -> closed");
        assert_eq!(closed.to, TenderState::Closed);
    }

    #[test]
    fn child_tender_responds_from_pending_only() {
        let flow = TenderFlow;
        let sent = flow
            .transition(TenderCategory::Tendering, TenderState::Pending, TenderEvent::Respond)
            .expect("pending -> sent");
        assert_eq!(sent.to, TenderState::Sent);

        let error = flow
            .transition(TenderCategory::Tendering, TenderState::Draft, TenderEvent::Launch)
            .expect_err("children never launch");
        assert!(matches!(error, FlowTransitionError::InvalidTenderTransition { .. }));
    }

    #[test]
    fn closed_and_draft_tenders_cannot_close() {
        let flow = TenderFlow;
        for state in [TenderState::Closed, TenderState::Draft] {
            assert!(flow
                .transition(TenderCategory::Coordinator, state, TenderEvent::Close)
                .is_err());
        }
    }

    #[test]
    fn edit_requires_draft_and_expand_requires_pre_launched() {
        let flow = TenderFlow;
        assert!(flow.permits(TenderAction::Edit, TenderState::Draft));
        assert!(!flow.permits(TenderAction::Edit, TenderState::PreLaunched));
        assert!(!flow.permits(TenderAction::Edit, TenderState::Sent));
        assert!(flow.permits(TenderAction::ExpandChildren, TenderState::PreLaunched));
        assert!(!flow.permits(TenderAction::ExpandChildren, TenderState::Draft));

        let error = flow
            .ensure_permitted(TenderAction::Edit, TenderState::Closed)
            .expect_err("closed tenders are read-only");
        assert_eq!(error.to_string(), "action edit is not permitted while tender is closed");
    }

    #[test]
    fn cancelled_quote_blocks_attachment_upload_and_download() {
        let flow = QuoteFlow;
        let cancelled = quote(QuoteItemState::Cancelled);

        assert!(flow.is_action_disabled(&cancelled, QuoteAction::AddAttachment));
        assert!(flow.is_action_disabled(&cancelled, QuoteAction::DownloadAttachment));
        assert!(flow.is_action_disabled(&cancelled, QuoteAction::Cancel));
        assert!(!flow.is_action_disabled(&cancelled, QuoteAction::AddRequestedDate));
        assert_eq!(
            flow.disabled_reason(&cancelled, QuoteAction::Chat).as_deref(),
            Some("Action disabled - quote is cancelled")
        );
    }

    #[test]
    fn accepted_quote_still_allows_download() {
        let flow = QuoteFlow;
        let accepted = quote(QuoteItemState::Accepted);

        assert!(!flow.is_action_disabled(&accepted, QuoteAction::DownloadAttachment));
        assert!(!flow.is_action_disabled(&accepted, QuoteAction::ViewDetails));
        assert!(flow.is_action_disabled(&accepted, QuoteAction::AddAttachment));
        assert!(flow.is_action_disabled(&accepted, QuoteAction::Reject));
    }

    #[test]
    fn provider_and_customer_accept_follow_the_lifecycle() {
        let flow = QuoteFlow;

        let accepted = flow.apply(&quote(QuoteItemState::Pending), QuoteAction::Accept).expect("accept");
        assert_eq!(accepted.to, Some(QuoteItemState::InProgress));
        assert!(flow.apply(&quote(QuoteItemState::Approved), QuoteAction::Accept).is_err());

        let submitted = flow
            .apply(&quote(QuoteItemState::InProgress), QuoteAction::SubmitQuotation)
            .expect("submit");
        assert_eq!(submitted.to, Some(QuoteItemState::Approved));

        let customer = flow
            .apply(&quote(QuoteItemState::Approved), QuoteAction::AcceptCustomer)
            .expect("customer accept");
        assert_eq!(customer.to, Some(QuoteItemState::Accepted));
        assert!(flow.apply(&quote(QuoteItemState::Pending), QuoteAction::AcceptCustomer).is_err());
    }

    #[test]
    fn cancel_and_reject_are_open_until_finalized() {
        let flow = QuoteFlow;
        for state in [
            QuoteItemState::Pending,
            QuoteItemState::InProgress,
            QuoteItemState::Approved,
            QuoteItemState::Rejected,
        ] {
            let outcome = flow.apply(&quote(state), QuoteAction::Cancel).expect("cancel");
            assert_eq!(outcome.to, Some(QuoteItemState::Cancelled));
        }

        assert!(flow.apply(&quote(QuoteItemState::Rejected), QuoteAction::Reject).is_err());
        let error = flow
            .apply(&quote(QuoteItemState::Accepted), QuoteAction::Cancel)
            .expect_err("accepted is terminal");
        assert_eq!(error.to_string(), "action cancel is not permitted while quote is accepted");
    }
}

//! Demo dataset: one tender in each interesting lifecycle position, a handful of
//! quotes against the launched tender's children, and a short chat transcript.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use tenderdesk_core::domain::chat::DEFAULT_CHAT_SENDER;
use tenderdesk_core::domain::quote::NewQuote;
use tenderdesk_core::domain::tender::{
    NewTender, ProviderRef, ResponseDeadline, TenderCategory, TenderState,
};
use tenderdesk_core::errors::DomainError;
use tenderdesk_core::flows::{QuoteAction, TenderEvent};

use crate::repositories::{ChatTranscripts, QuoteStore, RepositoryError, TenderStore};

const SEED_PROVIDERS: &[(&str, &str)] = &[
    ("org-aurora", "Aurora Networks"),
    ("org-bluefin", "Bluefin Telecom"),
    ("org-cobalt", "Cobalt Fibre"),
];

const DRAFT_NOTE: &str = "Seed: office connectivity refresh";
const LAUNCHED_NOTE: &str = "Seed: regional backbone upgrade";
const SENT_NOTE: &str = "Seed: data centre cross-connects";
const SEED_QUOTE_PREFIX: &str = "Seed quote";

const SEED_NOTES: &[&str] = &[DRAFT_NOTE, LAUNCHED_NOTE, SENT_NOTE];
const DEADLINE_DAYS_AHEAD: i64 = 14;

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Seeds the demo records unless a previous seed is still present.
    pub async fn load(
        tenders: &TenderStore,
        quotes: &QuoteStore,
        chat: &ChatTranscripts,
    ) -> Result<SeedResult, RepositoryError> {
        let existing = tenders.list().await?;
        if existing.iter().any(|tender| is_seed_note(tender.tender_note.as_deref())) {
            return Ok(SeedResult::default());
        }

        let deadline = seed_deadline()?;
        let providers: Vec<String> =
            SEED_PROVIDERS.iter().map(|(id, _)| (*id).to_owned()).collect();

        let mut created = tenders
            .create_many(vec![
                NewTender::coordinator_draft(deadline, providers[..2].to_vec())
                    .with_note(DRAFT_NOTE),
                NewTender::coordinator_draft(deadline, providers.clone()).with_note(LAUNCHED_NOTE),
                NewTender::coordinator_draft(deadline, providers[2..].to_vec())
                    .with_note(SENT_NOTE),
            ])
            .await?;
        let sent = created.pop().ok_or_else(seed_shape_error)?;
        let launched = created.pop().ok_or_else(seed_shape_error)?;

        let provider_refs: Vec<ProviderRef> =
            SEED_PROVIDERS.iter().map(|(id, name)| ProviderRef::new(*id, *name)).collect();
        let outcome = tenders.launch(&launched.id, &provider_refs).await?;
        tenders.transition(&sent.id, TenderEvent::Send).await?;

        // One quote per child, walked to progressively later states.
        let mut quotes_seeded = 0;
        for (step, child) in outcome.children.iter().enumerate() {
            let quote = quotes
                .create(NewQuote {
                    external_id: Some(child.id.0.clone()),
                    description: Some(format!(
                        "{SEED_QUOTE_PREFIX} from {}",
                        child.provider.as_deref().unwrap_or("provider")
                    )),
                    item_prices: vec![Some(Decimal::new(4_500_000 + step as i64 * 250_000, 2))],
                })
                .await?;
            let path: &[QuoteAction] = match step {
                0 => &[],
                1 => &[QuoteAction::Accept],
                _ => &[QuoteAction::Accept, QuoteAction::SubmitQuotation],
            };
            for action in path {
                quotes.apply_action(&quote.id, *action).await?;
            }
            quotes_seeded += 1;
        }

        chat.append(&launched.id, DEFAULT_CHAT_SENDER, "Please include installation lead times.")
            .await?;
        chat.append(&launched.id, SEED_PROVIDERS[0].0, "Lead time is six weeks from order.")
            .await?;

        Ok(SeedResult {
            seeded: true,
            tenders_seeded: 3 + outcome.children.len(),
            quotes_seeded,
            messages_seeded: 2,
        })
    }

    /// Checks that the seeded records are present in the expected states.
    pub async fn verify(
        tenders: &TenderStore,
        quotes: &QuoteStore,
        chat: &ChatTranscripts,
    ) -> Result<VerificationResult, RepositoryError> {
        let all = tenders.list().await?;
        let find = |note: &str| all.iter().find(|tender| tender.tender_note.as_deref() == Some(note));
        let mut checks = Vec::new();

        checks.push((
            "seed-draft-tender",
            find(DRAFT_NOTE).is_some_and(|tender| tender.state == TenderState::Draft),
        ));
        checks.push((
            "seed-sent-tender",
            find(SENT_NOTE).is_some_and(|tender| tender.state == TenderState::Sent),
        ));

        let launched = find(LAUNCHED_NOTE);
        checks.push((
            "seed-launched-tender",
            launched.is_some_and(|tender| tender.state == TenderState::PreLaunched),
        ));

        let children: Vec<_> = match launched {
            Some(parent) => all.iter().filter(|tender| tender.is_child_of(&parent.id)).collect(),
            None => Vec::new(),
        };
        checks.push((
            "seed-children",
            children.len() == SEED_PROVIDERS.len()
                && children.iter().all(|child| {
                    child.category == TenderCategory::Tendering && child.state == TenderState::Pending
                }),
        ));

        let seeded_quotes = quotes
            .list()
            .await?
            .into_iter()
            .filter(|quote| is_seed_quote(quote.description.as_deref()))
            .count();
        checks.push(("seed-quotes", seeded_quotes == SEED_PROVIDERS.len()));

        let messages = match launched {
            Some(parent) => chat.load(&parent.id).await?.len(),
            None => 0,
        };
        checks.push(("seed-chat", messages >= 2));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded tenders (children and transcripts included) and quotes.
    pub async fn clean(tenders: &TenderStore, quotes: &QuoteStore) -> Result<(), RepositoryError> {
        for tender in tenders.list_coordinators().await? {
            if is_seed_note(tender.tender_note.as_deref()) {
                tenders.delete(&tender.id).await?;
            }
        }
        for quote in quotes.list().await? {
            if is_seed_quote(quote.description.as_deref()) {
                quotes.delete(&quote.id).await?;
            }
        }
        Ok(())
    }
}

fn is_seed_note(note: Option<&str>) -> bool {
    note.is_some_and(|note| SEED_NOTES.contains(&note))
}

fn is_seed_quote(description: Option<&str>) -> bool {
    description.is_some_and(|description| description.starts_with(SEED_QUOTE_PREFIX))
}

fn seed_deadline() -> Result<ResponseDeadline, RepositoryError> {
    let at = Utc::now() + Duration::days(DEADLINE_DAYS_AHEAD);
    Ok(ResponseDeadline::parse(&at.format("%Y-%m-%dT%H:%M").to_string())?)
}

fn seed_shape_error() -> RepositoryError {
    DomainError::InvariantViolation("seed batch returned fewer tenders than requested".to_owned())
        .into()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedResult {
    /// False when an earlier seed was found and nothing was written.
    pub seeded: bool,
    pub tenders_seeded: usize,
    pub quotes_seeded: usize,
    pub messages_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

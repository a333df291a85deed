use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tenderdesk_core::attachment::encode_file;
use tenderdesk_core::config::LoadOptions;
use tenderdesk_core::domain::quote::{CompletionDate, CompletionDateKind, NewQuote, QuoteId};
use tenderdesk_core::domain::tender::TenderId;
use tenderdesk_core::flows::QuoteAction;
use tenderdesk_db::RepositoryError;

use crate::commands::{execute, CommandResult, Success};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateKind {
    Requested,
    Expected,
}

impl From<DateKind> for CompletionDateKind {
    fn from(kind: DateKind) -> Self {
        match kind {
            DateKind::Requested => Self::Requested,
            DateKind::Expected => Self::Expected,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum QuoteCommand {
    #[command(about = "List quotes, optionally for one tender")]
    List {
        #[arg(long)]
        tender: Option<String>,
    },
    #[command(about = "Show one quote")]
    Show { id: String },
    #[command(about = "Create a quote answering a tender")]
    Create {
        #[arg(long, help = "Tender the quote answers")]
        tender: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "price", help = "Item price; repeat for several items")]
        prices: Vec<Decimal>,
    },
    #[command(about = "Provider takes the request into work")]
    Accept { id: String },
    #[command(about = "Provider submits the priced quotation")]
    Submit { id: String },
    #[command(about = "Customer accepts the quotation")]
    AcceptCustomer { id: String },
    #[command(about = "Reject the quote")]
    Reject { id: String },
    #[command(about = "Cancel the quote")]
    Cancel { id: String },
    #[command(about = "Attach a file to the quote")]
    Attach {
        id: String,
        path: PathBuf,
        #[arg(long, help = "Override the guessed MIME type")]
        mime: Option<String>,
    },
    #[command(about = "Write the latest quote attachment to a directory")]
    Download {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    #[command(about = "Add a note to the quote")]
    Note {
        id: String,
        text: String,
        #[arg(long, default_value = "user")]
        author: String,
    },
    #[command(about = "Set a completion date (DD-MM-YYYY)")]
    Date {
        id: String,
        #[arg(long, value_enum)]
        kind: DateKind,
        date: String,
    },
    #[command(about = "Show which actions are available for the quote")]
    Actions { id: String },
}

pub fn run(options: &LoadOptions, command: QuoteCommand) -> CommandResult {
    match command {
        QuoteCommand::List { tender } => execute("quote list", options, |session| async move {
            let quotes = match tender {
                Some(tender) => session.quotes.list_for_tender(&tender).await,
                None => session.quotes.list().await,
            }
            .map_err(|error| session.fail(error))?;
            Success::with_data(format!("{} quote(s)", quotes.len()), &quotes)
        }),
        QuoteCommand::Show { id } => execute("quote show", options, |session| async move {
            let quote =
                session.quotes.get_by_id(&QuoteId(id)).await.map_err(|error| session.fail(error))?;
            Success::with_data(format!("quote {}", quote.id), &quote)
        }),
        QuoteCommand::Create { tender, description, prices } => {
            execute("quote create", options, |session| async move {
                // The tender must exist before anything can answer it.
                let tender = session
                    .tenders
                    .get_by_id(&TenderId(tender))
                    .await
                    .map_err(|error| session.fail(error))?;
                let data = NewQuote {
                    external_id: Some(tender.id.0),
                    description,
                    item_prices: prices.into_iter().map(Some).collect(),
                };
                let quote = session.quotes.create(data).await.map_err(|error| session.fail(error))?;
                Success::with_data(format!("created quote {}", quote.id), &quote)
            })
        }
        QuoteCommand::Accept { id } => apply(options, "quote accept", id, QuoteAction::Accept),
        QuoteCommand::Submit { id } => {
            apply(options, "quote submit", id, QuoteAction::SubmitQuotation)
        }
        QuoteCommand::AcceptCustomer { id } => {
            apply(options, "quote accept-customer", id, QuoteAction::AcceptCustomer)
        }
        QuoteCommand::Reject { id } => apply(options, "quote reject", id, QuoteAction::Reject),
        QuoteCommand::Cancel { id } => apply(options, "quote cancel", id, QuoteAction::Cancel),
        QuoteCommand::Attach { id, path, mime } => {
            execute("quote attach", options, |session| async move {
                let attachment = encode_file(&path, mime.as_deref())
                    .map_err(|error| session.fail(RepositoryError::from(error)))?;
                let quote = session
                    .quotes
                    .add_attachment(&QuoteId(id), attachment)
                    .await
                    .map_err(|error| session.fail(error))?;
                Success::with_data(format!("attached {} to quote {}", path.display(), quote.id), &quote)
            })
        }
        QuoteCommand::Download { id, out } => execute("quote download", options, |session| async move {
            let decoded = session
                .quotes
                .download_attachment(&QuoteId(id))
                .await
                .map_err(|error| session.fail(error))?;
            let written = decoded
                .write_to(&out)
                .map_err(|error| session.fail(RepositoryError::from(error)))?;
            Ok(Success::message(format!("wrote {}", written.display())))
        }),
        QuoteCommand::Note { id, text, author } => execute("quote note", options, |session| async move {
            let quote = session
                .quotes
                .add_note(&QuoteId(id), &author, &text)
                .await
                .map_err(|error| session.fail(error))?;
            Success::with_data(format!("quote {} has {} note(s)", quote.id, quote.note.len()), &quote)
        }),
        QuoteCommand::Date { id, kind, date } => execute("quote date", options, |session| async move {
            let date = CompletionDate::parse(&date).map_err(|error| session.fail(error))?;
            let quote = session
                .quotes
                .set_completion_date(&QuoteId(id), kind.into(), date)
                .await
                .map_err(|error| session.fail(error))?;
            Success::with_data(format!("updated completion date on quote {}", quote.id), &quote)
        }),
        QuoteCommand::Actions { id } => execute("quote actions", options, |session| async move {
            let actions =
                session.quotes.actions(&QuoteId(id)).await.map_err(|error| session.fail(error))?;
            let enabled = actions.iter().filter(|availability| !availability.disabled).count();
            Success::with_data(format!("{enabled} of {} action(s) enabled", actions.len()), &actions)
        }),
    }
}

fn apply(options: &LoadOptions, command: &str, id: String, action: QuoteAction) -> CommandResult {
    execute(command, options, |session| async move {
        let quote = session
            .quotes
            .apply_action(&QuoteId(id), action)
            .await
            .map_err(|error| session.fail(error))?;
        let state = quote.primary_state().map(|state| state.to_string()).unwrap_or_default();
        Success::with_data(format!("quote {} is now {state}", quote.id), &quote)
    })
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use tenderdesk_core::attachment::{download, encode_file};
use tenderdesk_core::config::LoadOptions;
use tenderdesk_core::domain::tender::{NewTender, ProviderRef, ResponseDeadline, TenderId, TenderPatch};
use tenderdesk_core::errors::{ApplicationError, DomainError};
use tenderdesk_core::flows::TenderEvent;
use tenderdesk_db::RepositoryError;

use crate::commands::{execute, CommandFailure, CommandResult, Session, Success};

#[derive(Debug, Subcommand)]
pub enum TenderCommand {
    #[command(about = "List coordinator tenders (or every tender with --all)")]
    List {
        #[arg(long, help = "Include child tenders")]
        all: bool,
        #[arg(long, help = "Only list children of this tender", conflicts_with = "all")]
        parent: Option<String>,
    },
    #[command(about = "Show one tender")]
    Show { id: String },
    #[command(about = "Create a coordinator draft")]
    Create {
        #[arg(long, help = "Response deadline, YYYY-MM-DDTHH:MM (UTC)")]
        deadline: String,
        #[arg(long = "provider", help = "Provider id; repeat for several")]
        providers: Vec<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long, help = "PDF file to attach")]
        attachment: Option<PathBuf>,
    },
    #[command(about = "Edit a draft tender")]
    Edit {
        id: String,
        #[arg(long)]
        deadline: Option<String>,
        #[arg(long = "provider", help = "Replace the selected providers")]
        providers: Vec<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        attachment: Option<PathBuf>,
        #[arg(long, help = "Fail unless the stored updatedAt still equals this RFC 3339 value")]
        if_unmodified_since: Option<String>,
    },
    #[command(about = "Launch a draft: one child tender per provider")]
    Launch {
        id: String,
        #[arg(
            long = "provider",
            value_parser = parse_provider_ref,
            help = "id=Display Name; defaults to the tender's selected providers"
        )]
        providers: Vec<ProviderRef>,
    },
    #[command(about = "List the children of a pre-launched tender")]
    Children { id: String },
    #[command(about = "Send a draft tender")]
    Send { id: String },
    #[command(about = "Respond to a pending child tender")]
    Respond { id: String },
    #[command(about = "Close a tender")]
    Close { id: String },
    #[command(about = "Delete a tender and its children")]
    Delete { id: String },
    #[command(about = "Write the tender attachment to a directory")]
    Download {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

pub fn run(options: &LoadOptions, command: TenderCommand) -> CommandResult {
    match command {
        TenderCommand::List { all, parent } => execute("tender list", options, |session| async move {
            let tenders = match parent {
                Some(parent) => session.tenders.list_by_parent(&TenderId(parent)).await,
                None if all => session.tenders.list().await,
                None => session.tenders.list_coordinators().await,
            }
            .map_err(|error| session.fail(error))?;
            Success::with_data(format!("{} tender(s)", tenders.len()), &tenders)
        }),
        TenderCommand::Show { id } => execute("tender show", options, |session| async move {
            let tender =
                session.tenders.get_by_id(&TenderId(id)).await.map_err(|error| session.fail(error))?;
            Success::with_data(format!("tender {}", tender.id), &tender)
        }),
        TenderCommand::Create { deadline, providers, note, attachment } => {
            execute("tender create", options, |session| async move {
                let deadline = parse_deadline(&session, &deadline)?;
                let mut data = NewTender::coordinator_draft(deadline, providers);
                if let Some(note) = note {
                    data = data.with_note(note);
                }
                if let Some(path) = attachment {
                    let encoded = encode_file(&path, None)
                        .map_err(|error| session.fail(RepositoryError::from(error)))?;
                    data = data.with_attachment(encoded);
                }

                let tender = session.tenders.create(data).await.map_err(|error| session.fail(error))?;
                Success::with_data(format!("created tender {}", tender.id), &tender)
            })
        }
        TenderCommand::Edit { id, deadline, providers, note, attachment, if_unmodified_since } => {
            execute("tender edit", options, |session| async move {
                let mut patch = TenderPatch {
                    tender_note: note,
                    selected_providers: (!providers.is_empty()).then_some(providers),
                    ..TenderPatch::default()
                };
                if let Some(deadline) = deadline {
                    patch.response_deadline = Some(parse_deadline(&session, &deadline)?);
                }
                if let Some(path) = attachment {
                    let encoded = encode_file(&path, None)
                        .map_err(|error| session.fail(RepositoryError::from(error)))?;
                    patch.attachment = Some(encoded);
                }

                let id = TenderId(id);
                let tender = match if_unmodified_since {
                    Some(raw) => {
                        let expected = parse_timestamp(&session, &raw)?;
                        session.tenders.update_if_unmodified(&id, expected, patch).await
                    }
                    None => session.tenders.update(&id, patch).await,
                }
                .map_err(|error| session.fail(error))?;
                Success::with_data(format!("updated tender {}", tender.id), &tender)
            })
        }
        TenderCommand::Launch { id, providers } => {
            execute("tender launch", options, |session| async move {
                let outcome = session
                    .tenders
                    .launch(&TenderId(id), &providers)
                    .await
                    .map_err(|error| session.fail(error))?;
                Success::with_data(
                    format!(
                        "launched tender {} with {} child tender(s)",
                        outcome.parent.id,
                        outcome.children.len()
                    ),
                    &outcome,
                )
            })
        }
        TenderCommand::Children { id } => execute("tender children", options, |session| async move {
            let children = session
                .tenders
                .expand_children(&TenderId(id))
                .await
                .map_err(|error| session.fail(error))?;
            Success::with_data(format!("{} child tender(s)", children.len()), &children)
        }),
        TenderCommand::Send { id } => transition(options, "tender send", id, TenderEvent::Send),
        TenderCommand::Respond { id } => {
            transition(options, "tender respond", id, TenderEvent::Respond)
        }
        TenderCommand::Close { id } => transition(options, "tender close", id, TenderEvent::Close),
        TenderCommand::Delete { id } => execute("tender delete", options, |session| async move {
            let removed =
                session.tenders.delete(&TenderId(id)).await.map_err(|error| session.fail(error))?;
            Ok(Success::message(format!("removed {removed} tender(s)")))
        }),
        TenderCommand::Download { id, out } => {
            execute("tender download", options, |session| async move {
                let tender = session
                    .tenders
                    .get_by_id(&TenderId(id))
                    .await
                    .map_err(|error| session.fail(error))?;
                let written = download(tender.attachment.as_ref())
                    .and_then(|decoded| decoded.write_to(&out))
                    .map_err(|error| session.fail(RepositoryError::from(error)))?;
                Ok(Success::message(format!("wrote {}", written.display())))
            })
        }
    }
}

fn transition(options: &LoadOptions, command: &str, id: String, event: TenderEvent) -> CommandResult {
    execute(command, options, |session| async move {
        let tender = session
            .tenders
            .transition(&TenderId(id), event)
            .await
            .map_err(|error| session.fail(error))?;
        Success::with_data(format!("tender {} is now {}", tender.id, tender.state), &tender)
    })
}

fn parse_deadline(session: &Session, raw: &str) -> Result<ResponseDeadline, CommandFailure> {
    ResponseDeadline::parse(raw).map_err(|error| session.fail(error))
}

fn parse_timestamp(session: &Session, raw: &str) -> Result<DateTime<Utc>, CommandFailure> {
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc)).map_err(|error| {
        session.fail(ApplicationError::Domain(DomainError::InvariantViolation(format!(
            "`{raw}` is not an RFC 3339 timestamp: {error}"
        ))))
    })
}

/// Accepts `id=Display Name` or a bare `id`, which doubles as the display name.
fn parse_provider_ref(raw: &str) -> Result<ProviderRef, String> {
    let (id, name) = match raw.split_once('=') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (raw.trim(), raw.trim()),
    };
    if id.is_empty() || name.is_empty() {
        return Err(format!("provider `{raw}` must look like id=Display Name"));
    }
    Ok(ProviderRef::new(id, name))
}

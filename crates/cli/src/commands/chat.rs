use clap::Subcommand;
use tenderdesk_core::config::LoadOptions;
use tenderdesk_core::domain::chat::DEFAULT_CHAT_SENDER;
use tenderdesk_core::domain::tender::TenderId;

use crate::commands::{execute, CommandResult, Success};

#[derive(Debug, Subcommand)]
pub enum ChatCommand {
    #[command(about = "Print a tender's chat transcript")]
    Show { tender_id: String },
    #[command(about = "Append a message to a tender's chat")]
    Send {
        tender_id: String,
        text: String,
        #[arg(long, default_value = DEFAULT_CHAT_SENDER)]
        sender: String,
    },
}

pub fn run(options: &LoadOptions, command: ChatCommand) -> CommandResult {
    match command {
        ChatCommand::Show { tender_id } => execute("chat show", options, |session| async move {
            let tender = session
                .tenders
                .get_by_id(&TenderId(tender_id))
                .await
                .map_err(|error| session.fail(error))?;
            let messages = session.chat.load(&tender.id).await.map_err(|error| session.fail(error))?;
            Success::with_data(format!("{} message(s) on tender {}", messages.len(), tender.id), &messages)
        }),
        ChatCommand::Send { tender_id, text, sender } => {
            execute("chat send", options, |session| async move {
                let tender = session
                    .tenders
                    .get_by_id(&TenderId(tender_id))
                    .await
                    .map_err(|error| session.fail(error))?;
                let message = session
                    .chat
                    .append(&tender.id, &sender, &text)
                    .await
                    .map_err(|error| session.fail(error))?;
                Success::with_data(format!("message sent on tender {}", tender.id), &message)
            })
        }
    }
}

use tenderdesk_core::config::LoadOptions;
use tenderdesk_db::DemoSeedDataset;

use crate::commands::{execute, CommandFailure, CommandResult, Success, EXIT_BAD_REQUEST};

pub fn run(options: &LoadOptions) -> CommandResult {
    execute("seed", options, |session| async move {
        let seeded = DemoSeedDataset::load(&session.tenders, &session.quotes, &session.chat)
            .await
            .map_err(|error| session.fail(error))?;

        let verification =
            DemoSeedDataset::verify(&session.tenders, &session.quotes, &session.chat)
                .await
                .map_err(|error| session.fail(error))?;
        if !verification.all_present {
            return Err(CommandFailure::new(
                "seed_verification",
                verification_failure_message(&verification.checks),
                EXIT_BAD_REQUEST,
            ));
        }

        let message = if seeded.seeded {
            format!(
                "demo dataset loaded: {} tenders, {} quotes, {} chat messages",
                seeded.tenders_seeded, seeded.quotes_seeded, seeded.messages_seeded
            )
        } else {
            "demo dataset already present; nothing to do".to_string()
        };
        Ok(Success::message(message))
    })
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

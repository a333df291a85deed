pub mod chat;
pub mod config;
pub mod migrate;
pub mod quote;
pub mod seed;
pub mod tender;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tenderdesk_core::audit::{AuditContext, AuditEvent, AuditSink};
use tenderdesk_core::config::{AppConfig, LoadOptions};
use tenderdesk_core::domain::identity::generate_id;
use tenderdesk_core::errors::{ApplicationError, InterfaceError};
use tenderdesk_db::{
    connect_storage, migrations, ChatTranscripts, KeyValueStore, QuoteStore, SqlKeyValueStore,
    TenderStore,
};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_BAD_REQUEST: u8 = 6;
pub const EXIT_NOT_FOUND: u8 = 7;
pub const EXIT_UNAVAILABLE: u8 = 8;
pub const EXIT_INTERNAL: u8 = 9;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[derive(Debug)]
pub(crate) struct CommandFailure {
    class: &'static str,
    message: String,
    exit_code: u8,
}

impl CommandFailure {
    pub(crate) fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }

    fn from_interface(error: &InterfaceError) -> Self {
        let exit_code = match error {
            InterfaceError::BadRequest { .. } => EXIT_BAD_REQUEST,
            InterfaceError::NotFound { .. } => EXIT_NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => EXIT_UNAVAILABLE,
            InterfaceError::Internal { .. } => EXIT_INTERNAL,
        };
        Self::new(error.class(), error.message(), exit_code)
    }
}

pub(crate) struct Success {
    message: String,
    data: Option<Value>,
}

impl Success {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None }
    }

    pub(crate) fn with_data<T: Serialize>(
        message: impl Into<String>,
        data: &T,
    ) -> Result<Self, CommandFailure> {
        let data = serde_json::to_value(data)
            .map_err(|error| CommandFailure::new("serialization", error.to_string(), EXIT_INTERNAL))?;
        Ok(Self { message: message.into(), data: Some(data) })
    }
}

/// Stores wired to the configured database for the duration of one command.
pub(crate) struct Session {
    pub tenders: TenderStore,
    pub quotes: QuoteStore,
    pub chat: ChatTranscripts,
    pub correlation_id: String,
}

impl Session {
    /// Maps a store or domain failure onto the command's error payload.
    pub(crate) fn fail(&self, error: impl Into<ApplicationError>) -> CommandFailure {
        let interface = error.into().into_interface(self.correlation_id.clone());
        tracing::warn!(
            event_name = "cli.command_failed",
            correlation_id = %self.correlation_id,
            error_class = interface.class(),
            error = interface.message(),
            "{}",
            interface.user_message()
        );
        CommandFailure::from_interface(&interface)
    }
}

/// Audit sink that forwards events to the log.
struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = "audit",
            audit_event = %event.event_type,
            subject_id = event.subject_id.as_deref().unwrap_or("-"),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            outcome = ?event.outcome,
            "audit event recorded"
        );
    }
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Loads config, opens and migrates the database, and runs `work` against a
/// fresh [`Session`].
pub(crate) fn execute<F, Fut>(command: &str, options: &LoadOptions, work: F) -> CommandResult
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<Success, CommandFailure>>,
{
    let config = match load_config(command, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let correlation_id = generate_id("cli");
    tracing::debug!(
        event_name = "cli.command_started",
        correlation_id = %correlation_id,
        command,
        "command started"
    );

    let result: Result<Success, CommandFailure> = runtime.block_on(async {
        let pool = connect_storage(&config.storage).await.map_err(|error| {
            CommandFailure::new("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY)
        })?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;

        let storage: Arc<dyn KeyValueStore> = Arc::new(SqlKeyValueStore::new(pool.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let context = AuditContext::new(correlation_id.clone(), "cli");
        let latency = config.store.latency();

        let session = Session {
            tenders: TenderStore::new(storage.clone())
                .with_latency(latency)
                .with_audit_sink(audit.clone())
                .with_context(context.clone()),
            quotes: QuoteStore::new(storage.clone())
                .with_latency(latency)
                .with_audit_sink(audit.clone())
                .with_context(context.clone()),
            chat: ChatTranscripts::new(storage)
                .with_latency(latency)
                .with_audit_sink(audit)
                .with_context(context),
            correlation_id: correlation_id.clone(),
        };

        let outcome = work(session).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(success) => CommandResult::success_with_data(command, success.message, success.data),
        Err(failure) => CommandResult::failure(command, failure.class, failure.message, failure.exit_code),
    }
}

use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("invalid response deadline `{0}` (expected YYYY-MM-DDTHH:MM)")]
    InvalidDeadline(String),
    #[error("response deadline {deadline} must be strictly in the future")]
    DeadlineNotInFuture { deadline: String },
    #[error("invalid completion date `{0}` (expected DD-MM-YYYY)")]
    InvalidCompletionDate(String),
    #[error("completion date {date} must be after today")]
    CompletionDateNotInFuture { date: String },
    #[error("attachment file unusable: {0}")]
    AttachmentFile(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("no attachment found")]
    MissingAttachment,
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// The storage backend could not be reached at all.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Short class label used in structured command output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Conflict(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            error @ (ApplicationError::NotFound { .. } | ApplicationError::MissingAttachment) => {
                Self::NotFound { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Upstream(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "missing required field".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.class(), "bad_request");
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface = ApplicationError::from(DomainError::DeadlineNotInFuture {
            deadline: "2020-01-01T10:00".to_owned(),
        })
        .into_interface("req-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
        assert!(interface.message().contains("2020-01-01T10:00"));
    }

    #[test]
    fn not_found_and_missing_attachment_surface_as_not_found() {
        let missing = ApplicationError::NotFound { entity: "tender", id: "tender_1_x".to_owned() }
            .into_interface("req-3");
        assert!(matches!(missing, InterfaceError::NotFound { .. }));
        assert_eq!(missing.message(), "tender `tender_1_x` not found");

        let attachment = ApplicationError::MissingAttachment.into_interface("req-4");
        assert_eq!(attachment.user_message(), "The requested record does not exist.");
        assert_eq!(attachment.message(), "no attachment found");
    }

    #[test]
    fn persistence_and_upstream_errors_map_to_service_unavailable() {
        for error in [
            ApplicationError::Persistence("database lock timeout".to_owned()),
            ApplicationError::Upstream("pool timed out while waiting for an open connection".to_owned()),
        ] {
            let interface = error.into_interface("req-5");
            assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
            assert_eq!(
                interface.user_message(),
                "The service is temporarily unavailable. Please retry shortly."
            );
        }
    }
}

use thiserror::Error;

use crate::domain::quote::QuoteStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::Validation(message.into()))
    }

    /// Network and persistence failures leave the quote at its last-known-good
    /// value, so the caller may offer a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Persistence(_))
    }
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
            Self::BadRequest { .. } => "The quote could not be updated. Check your input and try again.",
            Self::NotFound { .. } => "That code or item is not valid.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Your quote is unchanged; please retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
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
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Network(message) | ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError, InterfaceError};
    use crate::domain::quote::QuoteStatus;

    #[test]
    fn maps_domain_errors_to_bad_request() {
        let error = ApplicationError::from(DomainError::InvalidQuoteTransition {
            from: QuoteStatus::Submitted,
            to: QuoteStatus::Draft,
        });

        let mapped = error.into_interface("req-1");
        assert!(matches!(
            mapped,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            mapped.user_message(),
            "The quote could not be updated. Check your input and try again."
        );
    }

    #[test]
    fn maps_unknown_codes_to_not_found() {
        let mapped = ApplicationError::not_found("promo code", "NOPE").into_interface("req-2");

        assert!(matches!(mapped, InterfaceError::NotFound { .. }));
        assert_eq!(mapped.message(), "promo code `NOPE` was not found");
    }

    #[test]
    fn network_and_persistence_failures_are_retryable() {
        assert!(ApplicationError::Network("timeout".to_owned()).is_retryable());
        assert!(ApplicationError::Persistence("locked".to_owned()).is_retryable());
        assert!(!ApplicationError::validation("empty quote").is_retryable());

        let mapped: InterfaceError = ApplicationError::Network("timeout".to_owned()).into();
        assert!(matches!(mapped, InterfaceError::ServiceUnavailable { .. }));
    }
}

use dentalfly_core::errors::ApplicationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client configuration error: {0}")]
    Configuration(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Failures where the backend could not give an answer at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Decode(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Configuration(_) => false,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ClientError> for ApplicationError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Configuration(message) => ApplicationError::Configuration(message),
            error if error.is_unavailable() => ApplicationError::Network(error.to_string()),
            error => ApplicationError::validation(error.message()),
        }
    }
}

//! Errors surfaced by the domain services.

use crate::core::gateway::GenerationError;
use crate::infrastructure::traits::RepositoryError;
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A required field was empty or missing.
    #[error("{0}")]
    Validation(String),

    #[error("username is already taken")]
    DuplicateUsername,

    /// Bad credentials. Deliberately says nothing about which half was wrong.
    #[error("invalid credentials")]
    AuthFailure,

    #[error("authentication required")]
    Unauthorized,

    #[error("no active character session")]
    NoActiveCharacter,

    #[error("character not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Persistence(String),

    #[error("generation failure: {0}")]
    Generation(#[from] GenerationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    /// Text that is safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Persistence(_) | ChatError::Generation(_) | ChatError::Internal(_) => {
                "Something went wrong, please try again later".to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        error!("{e}");
        ChatError::Persistence(e.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_internal_details() {
        let err = ChatError::Persistence("disk I/O error at /var/lib/db".to_owned());
        assert!(!err.public_message().contains("/var/lib"));

        let err = ChatError::Generation(GenerationError::EmptyResponse);
        assert!(!err.public_message().contains("empty"));
    }

    #[test]
    fn test_public_message_keeps_user_facing_errors() {
        assert_eq!(
            ChatError::validation("Message cannot be empty").public_message(),
            "Message cannot be empty"
        );
        assert_eq!(ChatError::AuthFailure.public_message(), "invalid credentials");
    }
}

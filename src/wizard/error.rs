//! Error taxonomy of the wizard

use thiserror::Error;

use crate::api::SyncError;
use crate::state::PersistenceError;
use crate::steps::{OutOfRangeError, ValidationError};

/// Errors surfaced by wizard operations
#[derive(Error, Debug)]
pub enum WizardError {
    /// Local input problem; nothing was sent or stored
    #[error("invalid answer - {0}")]
    Validation(#[from] ValidationError),

    /// Remote call failed; state is exactly as before the attempt
    #[error("could not reach the scoring service - {0}")]
    Sync(#[from] SyncError),

    /// Finalization attempted before any successful submit
    #[error("cannot finish without a remote session; no step has been submitted")]
    MissingSession,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),

    /// The task driving the wizard has stopped
    #[error("wizard is no longer running")]
    Stopped,
}

impl WizardError {
    /// Whether the user can fix this by correcting input or retrying the same action
    pub fn is_retryable(&self) -> bool {
        matches!(self, WizardError::Validation(_) | WizardError::Sync(_))
    }

    /// Message suitable for showing next to the active step
    pub fn user_message(&self) -> String {
        match self {
            WizardError::Validation(e) => format!("Please check '{}': {}", e.field.prompt(), e.message),
            WizardError::Sync(e) if e.is_auth_error() => {
                "Your session has expired. Please sign in again and retry.".to_string()
            }
            WizardError::Sync(_) => {
                "We could not save this step. Check your connection and try again.".to_string()
            }
            WizardError::MissingSession => {
                "Your answers were not saved yet, so results cannot be shown. Please go back and resubmit."
                    .to_string()
            }
            other => format!("Something went wrong: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FieldName;

    #[test]
    fn test_retryable() {
        let validation = WizardError::Validation(ValidationError {
            field: FieldName::Email,
            message: "enter a valid e-mail address".to_string(),
        });
        assert!(validation.is_retryable());
        assert!(WizardError::Sync(SyncError::network("offline")).is_retryable());
        assert!(!WizardError::MissingSession.is_retryable());
        assert!(!WizardError::OutOfRange(OutOfRangeError { index: 30, last: 23 }).is_retryable());
    }

    #[test]
    fn test_user_message() {
        let validation = WizardError::Validation(ValidationError {
            field: FieldName::Email,
            message: "enter a valid e-mail address".to_string(),
        });
        assert!(validation.user_message().contains("E-mail address"));

        let auth = WizardError::Sync(SyncError::Unauthorized);
        assert!(auth.user_message().contains("sign in"));
    }
}

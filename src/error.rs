//! Typed, recoverable errors returned by grid commands.
//!
//! Nothing here is fatal: a rejected command leaves the simulation ticking
//! and the state untouched. Out-of-range time/temperature input is clamped
//! rather than reported, so there is no variant for it.

use thiserror::Error;

/// Result alias used by every command on the simulation core.
pub type Result<T> = std::result::Result<T, GridError>;

/// Error taxonomy for grid, cascade, dispatch, and arbiter commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("unknown substation id \"{0}\"")]
    InvalidSubstationId(String),

    #[error("substation \"{0}\" is already failed")]
    AlreadyFailed(String),

    #[error("substation \"{0}\" is already operational")]
    AlreadyOperational(String),

    #[error("scenario \"{held_by}\" is active")]
    ConflictActiveScenario { held_by: String },

    #[error("substation \"{0}\" is not failed; V2G dispatch requires a failed substation")]
    NotFailed(String),

    #[error("substation \"{0}\" already has an active V2G session")]
    SessionAlreadyActive(String),

    #[error("V2G recruitment for substation \"{0}\" timed out without enough vehicles")]
    InsufficientAssets(String),

    #[error("substation \"{0}\" has no active V2G session")]
    NoActiveSession(String),

    #[error("no failure cascade is running")]
    NoActiveCascade,

    #[error("scenario \"{requested}\" does not hold the lock (held by {held_by:?})")]
    NotLockOwner {
        requested: String,
        held_by: Option<String>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::GridError;

    #[test]
    fn conflict_message_names_holder() {
        let err = GridError::ConflictActiveScenario {
            held_by: "blackout_cascade".to_string(),
        };
        assert!(err.to_string().contains("blackout_cascade"));
    }

    #[test]
    fn errors_compare_by_value() {
        assert_eq!(
            GridError::AlreadyFailed("s1".into()),
            GridError::AlreadyFailed("s1".into())
        );
        assert_ne!(
            GridError::AlreadyFailed("s1".into()),
            GridError::AlreadyOperational("s1".into())
        );
    }
}

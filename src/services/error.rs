//! Error taxonomy of the coordinator
//!
//! Every variant except `Storage` is a rejected request that left the ledger
//! untouched.

use crate::domain::types::{ceil_minutes, IdentityId};
use chrono::TimeDelta;

/// A request that contradicts the current ledger state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Conflict {
    #[error("Card already registered!")]
    AlreadyRegistered,
    #[error("{name} is already checked in!")]
    AlreadyCheckedIn { name: String },
    #[error("Cannot check out: {name} never checked in!")]
    NeverCheckedIn { name: String },
    /// Toggle scan on a session younger than the checkout threshold
    #[error("Too soon! Wait {} min to check out.", ceil_minutes(.remaining))]
    TooSoon { name: String, remaining: TimeDelta },
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("Unknown Card")]
    NotFound(IdentityId),
    #[error("storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the failure is not the caller's fault
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_messages() {
        let too_soon =
            Conflict::TooSoon { name: "Ada".to_string(), remaining: TimeDelta::seconds(30) };
        assert_eq!(too_soon.to_string(), "Too soon! Wait 1 min to check out.");

        let never = Conflict::NeverCheckedIn { name: "Ada".to_string() };
        assert_eq!(never.to_string(), "Cannot check out: Ada never checked in!");

        let err: CoordinatorError = Conflict::AlreadyRegistered.into();
        assert_eq!(err.to_string(), "Card already registered!");
        assert!(!err.is_internal());
    }
}

//! The authenticated caller, as resolved by the session layer.

use crate::db::UserId;
use crate::error::AdmissionError;

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrentUser {
    pub id: UserId,
}

impl CurrentUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self { id: id.into() }
    }
}

/// External session collaborator.
pub trait CurrentUserProvider: Send + Sync {
    /// Resolve the caller, or `PermissionDenied` when nobody is signed in.
    fn resolve(&self) -> Result<CurrentUser, AdmissionError>;
}

/// A provider pinned to one user (service accounts, the CLI, tests).
#[derive(Debug, Clone)]
pub struct FixedUser(pub Option<CurrentUser>);

impl CurrentUserProvider for FixedUser {
    fn resolve(&self) -> Result<CurrentUser, AdmissionError> {
        self.0.clone().ok_or(AdmissionError::PermissionDenied)
    }
}

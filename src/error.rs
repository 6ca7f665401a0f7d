//! Unified error handling for the admission core.
//!
//! Every failure a caller can observe is one [`AdmissionError`] kind with a
//! stable metrics label ([`AdmissionError::error_code`]) and a stable
//! user-facing message ([`AdmissionError::user_message`]).

use crate::db::DbError;
use thiserror::Error;

/// Admission operation errors.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("membership already active")]
    AlreadyActive,

    #[error("already on the waitlist")]
    AlreadyWaiting,

    #[error("scope is not active")]
    ScopeNotActive,

    #[error("sole owner cannot leave")]
    SoleOwnerCannotLeave,

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("invitation is not pending")]
    InvitationNotPending,

    /// Lock contention on the admission decision. Retried inside the
    /// scope actor; callers only see [`AdmissionError::Transient`].
    #[error("capacity check lost a race")]
    CapacityRace,

    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Storage(DbError),
}

impl AdmissionError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::AlreadyActive => "already_active",
            Self::AlreadyWaiting => "already_waiting",
            Self::ScopeNotActive => "scope_not_active",
            Self::SoleOwnerCannotLeave => "sole_owner_cannot_leave",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvitationNotPending => "invitation_not_pending",
            Self::CapacityRace => "capacity_race",
            Self::Transient(_) => "transient",
            Self::Storage(_) => "storage",
        }
    }

    /// Message shown to the end user. Stable per kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "We couldn't find what you were looking for.",
            Self::PermissionDenied => "You don't have permission to do that.",
            Self::AlreadyActive => "You already have a membership or a pending request here.",
            Self::AlreadyWaiting => "You're already on the waitlist.",
            Self::ScopeNotActive => "This group or event is no longer accepting members.",
            Self::SoleOwnerCannotLeave => {
                "You're the only owner. Hand ownership to someone else before leaving."
            }
            Self::InvalidTransition { .. } => "That action isn't possible right now.",
            Self::InvitationNotPending => "This invitation is no longer available.",
            Self::CapacityRace | Self::Transient(_) => "Something got busy. Please try again.",
            Self::Storage(_) => "Something went wrong on our side.",
        }
    }

    /// Worth retrying the whole unit of work.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CapacityRace => true,
            Self::Storage(e) => e.is_contention(),
            _ => false,
        }
    }

    /// Logical errors are the caller's doing; the rest are ours.
    pub fn is_logical(&self) -> bool {
        !matches!(
            self,
            Self::CapacityRace | Self::Transient(_) | Self::Storage(_)
        )
    }
}

impl From<DbError> for AdmissionError {
    fn from(err: DbError) -> Self {
        if err.is_contention() {
            AdmissionError::CapacityRace
        } else {
            AdmissionError::Storage(err)
        }
    }
}

impl From<sqlx::Error> for AdmissionError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

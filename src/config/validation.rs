//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("database.path is required")]
    MissingDatabasePath,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("admission.invitation_window_secs must be positive, got {0}")]
    InvitationWindow(i64),
    #[error("admission.retry_attempts must be at least 1")]
    RetryAttempts,
    #[error("admission.request_timeout_ms must be positive")]
    RequestTimeout,
    #[error("admission.mailbox_capacity must be positive")]
    MailboxCapacity,
    #[error("admission.sweep_interval_secs must be positive")]
    SweepInterval,
    #[error("admission.actor_idle_ms must be positive")]
    ActorIdle,
    #[error("admission.outbox_capacity must be positive")]
    OutboxCapacity,
    #[error("metrics.port must not be 0")]
    MetricsPort,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let db_path = config.database.path.as_str();
    if db_path.is_empty() {
        errors.push(ValidationError::MissingDatabasePath);
    } else if db_path != ":memory:"
        && let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(db_path.to_string()));
    }

    let admission = &config.admission;
    if admission.invitation_window_secs <= 0 {
        errors.push(ValidationError::InvitationWindow(
            admission.invitation_window_secs,
        ));
    }
    if admission.retry_attempts == 0 {
        errors.push(ValidationError::RetryAttempts);
    }
    if admission.request_timeout_ms == 0 {
        errors.push(ValidationError::RequestTimeout);
    }
    if admission.mailbox_capacity == 0 {
        errors.push(ValidationError::MailboxCapacity);
    }
    if admission.sweep_interval_secs == 0 {
        errors.push(ValidationError::SweepInterval);
    }
    if admission.actor_idle_ms == 0 {
        errors.push(ValidationError::ActorIdle);
    }
    if admission.outbox_capacity == 0 {
        errors.push(ValidationError::OutboxCapacity);
    }

    if let Some(metrics) = &config.metrics
        && metrics.port == 0
    {
        errors.push(ValidationError::MetricsPort);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Admission tunables.

use serde::Deserialize;
use std::time::Duration;

/// Admission configuration.
///
/// All durations are stored as integers so the TOML stays flat.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// How long a promoted waitlist user has to accept (default: 24h).
    #[serde(default = "default_invitation_window_secs")]
    pub invitation_window_secs: i64,
    /// Attempts per unit of work when SQLite reports contention (default: 3).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Backoff step between attempts; attempt `n` sleeps `n * step` (default: 25ms).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long a caller waits for its scope actor to answer (default: 5s).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Scope actor mailbox capacity (default: 100).
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Period of the invitation expiry sweep (default: 60s).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// A scope actor with an empty mailbox for this long retires (default: 5min).
    #[serde(default = "default_actor_idle_ms")]
    pub actor_idle_ms: u64,
    /// Committed notification batches waiting for delivery (default: 1024).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl AdmissionConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn actor_idle(&self) -> Duration {
        Duration::from_millis(self.actor_idle_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            invitation_window_secs: default_invitation_window_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            actor_idle_ms: default_actor_idle_ms(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

fn default_invitation_window_secs() -> i64 {
    24 * 60 * 60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_mailbox_capacity() -> usize {
    100
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_actor_idle_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_outbox_capacity() -> usize {
    1_024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_correct() {
        let config = AdmissionConfig::default();
        assert_eq!(config.invitation_window_secs, 86_400);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_backoff(), Duration::from_millis(25));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.mailbox_capacity, 100);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.actor_idle(), Duration::from_secs(300));
        assert_eq!(config.outbox_capacity, 1_024);
    }
}

//! Prometheus metrics for the admission core.
//!
//! - `rollcall_admission_outcomes_total{outcome}` - accepted / pending / waitlisted
//! - `rollcall_admission_errors_total{operation, error}` - failures by stable error code
//! - `rollcall_promotions_total` - waitlist entries moved to INVITED
//! - `rollcall_invitations_expired_total` - invitations closed by the sweep
//! - `rollcall_contention_retries_total{operation}` - units retried after BUSY/LOCKED
//! - `rollcall_scope_actors` - live scope actors

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Join decisions by outcome.
pub static ADMISSION_OUTCOMES: OnceLock<IntCounterVec> = OnceLock::new();

/// Operation failures by error code.
pub static ADMISSION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Waitlist promotions (WAITING -> INVITED).
pub static PROMOTIONS: OnceLock<IntCounter> = OnceLock::new();

/// Invitations expired by the sweep.
pub static INVITATIONS_EXPIRED: OnceLock<IntCounter> = OnceLock::new();

/// Units of work retried after storage contention.
pub static CONTENTION_RETRIES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Scope actors currently running.
pub static SCOPE_ACTORS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers anything.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(ADMISSION_OUTCOMES, IntCounterVec::new(Opts::new("rollcall_admission_outcomes_total", "Join decisions by outcome"), &["outcome"]));
    register!(ADMISSION_ERRORS, IntCounterVec::new(Opts::new("rollcall_admission_errors_total", "Admission failures by operation and error code"), &["operation", "error"]));
    register!(PROMOTIONS, IntCounter::new("rollcall_promotions_total", "Waitlist entries promoted to INVITED"));
    register!(INVITATIONS_EXPIRED, IntCounter::new("rollcall_invitations_expired_total", "Invitations expired by the sweep"));
    register!(CONTENTION_RETRIES, IntCounterVec::new(Opts::new("rollcall_contention_retries_total", "Units of work retried after storage contention"), &["operation"]));
    register!(SCOPE_ACTORS, IntGauge::new("rollcall_scope_actors", "Scope actors currently running"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers. All of them are no-ops until `init` has run.
// ============================================================================

#[inline]
pub fn record_outcome(outcome: &str) {
    if let Some(c) = ADMISSION_OUTCOMES.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

#[inline]
pub fn record_error(operation: &str, code: &str) {
    if let Some(c) = ADMISSION_ERRORS.get() {
        c.with_label_values(&[operation, code]).inc();
    }
}

#[inline]
pub fn record_promotions(count: usize) {
    if let Some(c) = PROMOTIONS.get() {
        c.inc_by(count as u64);
    }
}

#[inline]
pub fn record_expirations(count: usize) {
    if let Some(c) = INVITATIONS_EXPIRED.get() {
        c.inc_by(count as u64);
    }
}

#[inline]
pub fn record_retry(operation: &str) {
    if let Some(c) = CONTENTION_RETRIES.get() {
        c.with_label_values(&[operation]).inc();
    }
}

#[inline]
pub fn scope_actor_started() {
    if let Some(g) = SCOPE_ACTORS.get() {
        g.inc();
    }
}

#[inline]
pub fn scope_actor_stopped() {
    if let Some(g) = SCOPE_ACTORS.get() {
        g.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_outcome("waitlisted");
        record_error("request_join", "already_active");
        record_promotions(2);

        let output = gather_metrics();
        assert!(output.contains("rollcall_admission_outcomes_total"));
        assert!(output.contains("already_active"));
        assert!(output.contains("rollcall_promotions_total"));
    }
}

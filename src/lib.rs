//! rollcall - capacity-bounded admission for groups and events.
//!
//! Decides whether someone asking to join a scope is admitted at once, held
//! for review or put on a FIFO waitlist, and hands freed places to waiters
//! through time-boxed invitations. The capacity ceiling holds under
//! concurrent requests: every scope's mutations are serialized through one
//! actor and each decision commits in a single SQLite transaction.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use rollcall::{AdmissionService, CurrentUser, Database, LogSink, SqliteScopeLookup, SystemClock};
//! use rollcall::config::AdmissionConfig;
//! use std::sync::Arc;
//!
//! let db = Database::new("rollcall.db").await?;
//! let service = AdmissionService::new(
//!     db.clone(),
//!     Arc::new(SqliteScopeLookup::new(db)),
//!     Arc::new(LogSink),
//!     Arc::new(SystemClock),
//!     AdmissionConfig::default(),
//! );
//! let outcome = service.request_join(&CurrentUser::new("ada"), 42).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod identity;
pub mod metrics;
pub mod notify;
pub mod sweep;

pub use admission::{AdmissionOutcome, AdmissionService, Capability, LeaveOutcome, Moment};
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{
    Database, DbError, EntryStatus, Membership, MembershipStatus, Role, Scope, ScopeKind,
    ScopeLookup, ScopeStatus, SqliteScopeLookup, Visibility, WaitlistEntry,
};
pub use error::AdmissionError;
pub use identity::{CurrentUser, CurrentUserProvider, FixedUser};
pub use notify::{LogSink, Notification, NotificationKind, NotificationSink};
pub use sweep::spawn_invitation_sweeper;

//! Database module for persistent admission state.
//!
//! Provides async SQLite access using SQLx for:
//! - Scope metadata (read-only for the admission core)
//! - Memberships (the Membership Registry's rows)
//! - Waitlists and waitlist entries (the Waitlist Queue's rows)
//!
//! Every mutation runs inside a [`UnitOfWork`]: one SQLite transaction plus
//! the notifications it wants to emit once it commits.

mod memberships;
mod scopes;
mod waitlist;

pub use memberships::{Membership, MembershipRepository, MembershipStatus, Role};
pub use scopes::{
    Scope, ScopeKind, ScopeLookup, ScopeRepository, ScopeStatus, SqliteScopeLookup, Visibility,
};
pub use waitlist::{EntryStatus, Waitlist, WaitlistEntry, WaitlistRepository};

use crate::notify::{Notification, NotificationKind};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Row ids are SQLite rowids.
pub type ScopeId = i64;
pub type MembershipId = i64;
pub type EntryId = i64;
/// Users are identified by the opaque id the session layer hands us.
pub type UserId = String;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("integrity check failed: {0}")]
    Integrity(String),
}

impl DbError {
    /// True when the failure is lock contention rather than a logical error:
    /// SQLITE_BUSY / SQLITE_LOCKED (and their extended codes) or a pool
    /// acquire timeout. These are safe to retry from the top of a unit.
    pub fn is_contention(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::PoolTimedOut) => true,
            DbError::Sqlx(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
            }
            _ => false,
        }
    }

    /// True when a UNIQUE constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::Sqlx(sqlx::Error::Database(e)) if e.is_unique_violation())
    }
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - a stuck writer surfaces as contention
    /// instead of blocking a scope actor forever.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// How long SQLite itself waits on a locked database before BUSY.
    const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache memory database per call;
            // a plain `:memory:` would collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:rollcall-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .foreign_keys(true)
                .busy_timeout(Self::BUSY_TIMEOUT);

            // The memory database lives as long as its last connection.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Self::BUSY_TIMEOUT);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Integrity(integrity_result));
        }

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Open a unit of work. Dropping it without [`UnitOfWork::commit`]
    /// rolls everything back, buffered notifications included.
    pub async fn begin(&self) -> Result<UnitOfWork, DbError> {
        let tx = self.pool.begin().await?;
        Ok(UnitOfWork {
            tx,
            outbox: Vec::new(),
        })
    }
}

/// One atomic admission step: a transaction and its pending notifications.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    outbox: Vec<Notification>,
}

impl UnitOfWork {
    /// Membership rows.
    pub fn memberships(&mut self) -> MembershipRepository<'_> {
        MembershipRepository::new(&mut *self.tx)
    }

    /// Waitlist and waitlist-entry rows.
    pub fn waitlist(&mut self) -> WaitlistRepository<'_> {
        WaitlistRepository::new(&mut *self.tx)
    }

    /// Scope rows.
    pub fn scopes(&mut self) -> ScopeRepository<'_> {
        ScopeRepository::new(&mut *self.tx)
    }

    /// Queue a notification; it is only delivered if the unit commits.
    pub fn notify(&mut self, user_id: &str, kind: NotificationKind, related_id: i64) {
        self.outbox.push(Notification {
            user_id: user_id.to_string(),
            kind,
            related_id,
        });
    }

    /// Notifications queued so far.
    pub fn pending_notifications(&self) -> &[Notification] {
        &self.outbox
    }

    /// Commit the transaction and hand back the notifications to deliver.
    pub async fn commit(self) -> Result<Vec<Notification>, DbError> {
        self.tx.commit().await?;
        Ok(self.outbox)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}

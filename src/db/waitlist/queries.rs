//! Waitlist repository for database queries.

use super::models::{EntryStatus, Waitlist, WaitlistEntry};
use crate::db::{DbError, EntryId, ScopeId};
use sqlx::SqliteConnection;

const ENTRY_SELECT: &str = r#"
SELECT e.id, e.waitlist_id, w.scope_id, e.user_id, e.position, e.status,
       e.joined_at, e.invitation_expires_at
FROM waitlist_entries e
JOIN waitlists w ON w.id = e.waitlist_id
"#;

/// Repository for waitlist operations.
pub struct WaitlistRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> WaitlistRepository<'c> {
    /// Create a new waitlist repository.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// The scope's waitlist, created on first use.
    pub async fn ensure_waitlist(&mut self, scope_id: ScopeId) -> Result<Waitlist, DbError> {
        sqlx::query("INSERT OR IGNORE INTO waitlists (scope_id) VALUES (?)")
            .bind(scope_id)
            .execute(&mut *self.conn)
            .await?;

        let row = sqlx::query_as::<_, Waitlist>(
            "SELECT id, scope_id, next_position FROM waitlists WHERE scope_id = ?",
        )
        .bind(scope_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(row)
    }

    /// Claim the next tail position. Read and increment happen in one
    /// statement, so two claims can never see the same value.
    pub async fn take_position(&mut self, waitlist_id: i64) -> Result<i64, DbError> {
        let position: i64 = sqlx::query_scalar(
            r#"
            UPDATE waitlists
            SET next_position = next_position + 1
            WHERE id = ?
            RETURNING next_position
            "#,
        )
        .bind(waitlist_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(position)
    }

    /// Find an entry by id.
    pub async fn find_entry(&mut self, id: EntryId) -> Result<Option<WaitlistEntry>, DbError> {
        let sql = format!("{ENTRY_SELECT} WHERE e.id = ?");
        let row = sqlx::query_as::<_, WaitlistEntry>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// The user's WAITING or INVITED entry in a scope.
    pub async fn find_live_for(
        &mut self,
        scope_id: ScopeId,
        user_id: &str,
    ) -> Result<Option<WaitlistEntry>, DbError> {
        let sql = format!(
            "{ENTRY_SELECT} WHERE w.scope_id = ? AND e.user_id = ? AND e.status IN ('WAITING', 'INVITED')"
        );
        let row = sqlx::query_as::<_, WaitlistEntry>(&sql)
            .bind(scope_id)
            .bind(user_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Drop a user's DECLINED/EXPIRED entries so a fresh one can replace them.
    pub async fn delete_stale_for(
        &mut self,
        waitlist_id: i64,
        user_id: &str,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM waitlist_entries
            WHERE waitlist_id = ? AND user_id = ? AND status IN ('DECLINED', 'EXPIRED')
            "#,
        )
        .bind(waitlist_id)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert a WAITING entry at `position`.
    pub async fn insert_entry(
        &mut self,
        waitlist: &Waitlist,
        user_id: &str,
        position: i64,
        now: i64,
    ) -> Result<WaitlistEntry, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO waitlist_entries (waitlist_id, user_id, position, status, joined_at)
            VALUES (?, ?, ?, 'WAITING', ?)
            "#,
        )
        .bind(waitlist.id)
        .bind(user_id)
        .bind(position)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(WaitlistEntry {
            id: result.last_insert_rowid(),
            waitlist_id: waitlist.id,
            scope_id: waitlist.scope_id,
            user_id: user_id.to_string(),
            position,
            status: EntryStatus::Waiting,
            joined_at: now,
            invitation_expires_at: None,
        })
    }

    /// Lowest-position WAITING entry of a scope.
    pub async fn head(&mut self, scope_id: ScopeId) -> Result<Option<WaitlistEntry>, DbError> {
        let sql = format!(
            "{ENTRY_SELECT} WHERE w.scope_id = ? AND e.status = 'WAITING' ORDER BY e.position ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, WaitlistEntry>(&sql)
            .bind(scope_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// WAITING → INVITED. False if the entry was not WAITING.
    pub async fn mark_invited(&mut self, id: EntryId, expires_at: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE waitlist_entries
            SET status = 'INVITED', invitation_expires_at = ?
            WHERE id = ? AND status = 'WAITING'
            "#,
        )
        .bind(expires_at)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// INVITED → `to` (DECLINED or EXPIRED). False if the entry was not INVITED.
    pub async fn close_invitation(&mut self, id: EntryId, to: EntryStatus) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE waitlist_entries SET status = ? WHERE id = ? AND status = 'INVITED'",
        )
        .bind(to)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hard-delete an entry.
    pub async fn delete_entry(&mut self, id: EntryId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM waitlist_entries WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Entries of a scope in the given statuses, ascending by position.
    pub async fn list(
        &mut self,
        scope_id: ScopeId,
        statuses: &[EntryStatus],
    ) -> Result<Vec<WaitlistEntry>, DbError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "{ENTRY_SELECT} WHERE w.scope_id = ? AND e.status IN ({placeholders}) ORDER BY e.position ASC"
        );
        let mut query = sqlx::query_as::<_, WaitlistEntry>(&sql).bind(scope_id);
        for status in statuses {
            query = query.bind(*status);
        }
        let rows = query.fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }

    /// INVITED entries whose window is still open: each holds a slot.
    pub async fn count_open_invitations(
        &mut self,
        scope_id: ScopeId,
        now: i64,
    ) -> Result<u32, DbError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM waitlist_entries e
            JOIN waitlists w ON w.id = e.waitlist_id
            WHERE w.scope_id = ? AND e.status = 'INVITED' AND e.invitation_expires_at > ?
            "#,
        )
        .bind(scope_id)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// INVITED entries of a scope whose window closed at or before `now`.
    pub async fn expired_invitations(
        &mut self,
        scope_id: ScopeId,
        now: i64,
    ) -> Result<Vec<WaitlistEntry>, DbError> {
        let sql = format!(
            r#"{ENTRY_SELECT}
            WHERE w.scope_id = ? AND e.status = 'INVITED' AND e.invitation_expires_at <= ?
            ORDER BY e.position ASC"#
        );
        let rows = sqlx::query_as::<_, WaitlistEntry>(&sql)
            .bind(scope_id)
            .bind(now)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    /// Scopes holding at least one lapsed invitation.
    pub async fn scopes_with_expired_invitations(
        &mut self,
        now: i64,
    ) -> Result<Vec<ScopeId>, DbError> {
        let rows: Vec<ScopeId> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT w.scope_id
            FROM waitlist_entries e
            JOIN waitlists w ON w.id = e.waitlist_id
            WHERE e.status = 'INVITED' AND e.invitation_expires_at <= ?
            ORDER BY w.scope_id
            "#,
        )
        .bind(now)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }
}

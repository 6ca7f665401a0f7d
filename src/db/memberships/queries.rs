//! Membership repository for database queries.
//!
//! Conditional updates (`WHERE status = ?`) return the updated row, or
//! `None` when the row was not in the expected state. Callers treat `None`
//! as a lost race and never write blindly.

use super::models::{Membership, MembershipStatus, Role};
use crate::db::{DbError, MembershipId, ScopeId};
use sqlx::SqliteConnection;

const MEMBERSHIP_COLUMNS: &str = "id, user_id, scope_id, role, status, joined_at, check_in_time";

/// Repository for membership operations.
pub struct MembershipRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MembershipRepository<'c> {
    /// Create a new membership repository.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Find a membership by id.
    pub async fn find(&mut self, id: MembershipId) -> Result<Option<Membership>, DbError> {
        let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = ?");
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Find the (single) membership row of a user in a scope.
    pub async fn find_for(
        &mut self,
        user_id: &str,
        scope_id: ScopeId,
    ) -> Result<Option<Membership>, DbError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = ? AND scope_id = ?"
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(user_id)
            .bind(scope_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Insert a fresh membership row.
    pub async fn insert(
        &mut self,
        user_id: &str,
        scope_id: ScopeId,
        status: MembershipStatus,
        role: Role,
        now: i64,
    ) -> Result<Membership, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO memberships (user_id, scope_id, role, status, joined_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(scope_id)
        .bind(role)
        .bind(status)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(Membership {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            scope_id,
            role,
            status,
            joined_at: now,
            check_in_time: None,
        })
    }

    /// Start a new cycle on a terminal row: status, role and `joined_at`
    /// are reset and any check-in is cleared.
    pub async fn reapply(
        &mut self,
        id: MembershipId,
        status: MembershipStatus,
        role: Role,
        now: i64,
    ) -> Result<Option<Membership>, DbError> {
        let sql = format!(
            r#"
            UPDATE memberships
            SET status = ?, role = ?, joined_at = ?, check_in_time = NULL
            WHERE id = ? AND status NOT IN ('PENDING', 'ACCEPTED')
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(status)
            .bind(role)
            .bind(now)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Move a membership from `from` to `to`.
    pub async fn update_status(
        &mut self,
        id: MembershipId,
        from: MembershipStatus,
        to: MembershipStatus,
    ) -> Result<Option<Membership>, DbError> {
        let sql = format!(
            r#"
            UPDATE memberships
            SET status = ?
            WHERE id = ? AND status = ?
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(to)
            .bind(id)
            .bind(from)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Hard-delete a PENDING application.
    pub async fn delete_pending(&mut self, id: MembershipId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM memberships WHERE id = ? AND status = 'PENDING'")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Change the role of an ACCEPTED membership.
    pub async fn set_role(
        &mut self,
        id: MembershipId,
        role: Role,
    ) -> Result<Option<Membership>, DbError> {
        let sql = format!(
            r#"
            UPDATE memberships
            SET role = ?
            WHERE id = ? AND status = 'ACCEPTED'
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(role)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Record attendance on an ACCEPTED membership.
    pub async fn set_check_in(
        &mut self,
        id: MembershipId,
        at: i64,
    ) -> Result<Option<Membership>, DbError> {
        let sql = format!(
            r#"
            UPDATE memberships
            SET check_in_time = ?
            WHERE id = ? AND status = 'ACCEPTED'
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(at)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Number of ACCEPTED memberships in a scope.
    pub async fn count_accepted(&mut self, scope_id: ScopeId) -> Result<u32, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE scope_id = ? AND status = 'ACCEPTED'",
        )
        .bind(scope_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Number of ACCEPTED memberships holding `role` in a scope.
    pub async fn count_accepted_with_role(
        &mut self,
        scope_id: ScopeId,
        role: Role,
    ) -> Result<u32, DbError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM memberships
            WHERE scope_id = ? AND status = 'ACCEPTED' AND role = ?
            "#,
        )
        .bind(scope_id)
        .bind(role)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// All ACCEPTED memberships of a scope, oldest first.
    pub async fn list_accepted(&mut self, scope_id: ScopeId) -> Result<Vec<Membership>, DbError> {
        let sql = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS} FROM memberships
            WHERE scope_id = ? AND status = 'ACCEPTED'
            ORDER BY joined_at ASC, id ASC
            "#
        );
        let rows = sqlx::query_as::<_, Membership>(&sql)
            .bind(scope_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }
}

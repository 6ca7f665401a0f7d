//! Scope metadata: the groups and events users can join.
//!
//! Scopes belong to the application's domain layer. The admission core reads
//! them through [`ScopeLookup`]; [`ScopeRepository::upsert`] exists so the
//! domain layer (and tests) can keep the local copy in sync.

use super::{DbError, Database, ScopeId};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqliteConnection;

/// What kind of gathering a scope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Group,
    Event,
}

/// Who may join without review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Anyone may join; capacity decides between accept and waitlist.
    Public,
    /// Every request needs approval.
    Private,
    /// Restricted to members of a parent group; every request needs approval.
    GroupRestricted,
}

impl Visibility {
    /// Requests against this scope wait for a reviewer.
    pub fn requires_review(self) -> bool {
        !matches!(self, Visibility::Public)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeStatus {
    Active,
    Canceled,
    Archived,
}

/// A capacity-bounded joinable entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
    pub kind: ScopeKind,
    pub visibility: Visibility,
    pub status: ScopeStatus,
    /// `None` means unbounded.
    pub max_capacity: Option<u32>,
}

impl Scope {
    /// A new, active scope.
    pub fn new(
        id: ScopeId,
        name: &str,
        kind: ScopeKind,
        visibility: Visibility,
        max_capacity: Option<u32>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            visibility,
            status: ScopeStatus::Active,
            max_capacity,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ScopeStatus::Active
    }
}

/// Read-only access to scope metadata.
#[async_trait]
pub trait ScopeLookup: Send + Sync {
    /// Fetch a scope by id, `None` if it does not exist.
    async fn get(&self, scope_id: ScopeId) -> Result<Option<Scope>, DbError>;
}

/// [`ScopeLookup`] over the local `scopes` table.
#[derive(Clone)]
pub struct SqliteScopeLookup {
    db: Database,
}

impl SqliteScopeLookup {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScopeLookup for SqliteScopeLookup {
    async fn get(&self, scope_id: ScopeId) -> Result<Option<Scope>, DbError> {
        let mut conn = self.db.pool().acquire().await?;
        ScopeRepository::new(&mut conn).find(scope_id).await
    }
}

/// Repository for scope rows.
pub struct ScopeRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ScopeRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Find a scope by id.
    pub async fn find(&mut self, scope_id: ScopeId) -> Result<Option<Scope>, DbError> {
        let scope = sqlx::query_as::<_, Scope>(
            r#"
            SELECT id, name, kind, visibility, status, max_capacity
            FROM scopes
            WHERE id = ?
            "#,
        )
        .bind(scope_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(scope)
    }

    /// Insert or overwrite a scope.
    pub async fn upsert(&mut self, scope: &Scope) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO scopes (id, name, kind, visibility, status, max_capacity)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                visibility = excluded.visibility,
                status = excluded.status,
                max_capacity = excluded.max_capacity
            "#,
        )
        .bind(scope.id)
        .bind(&scope.name)
        .bind(scope.kind)
        .bind(scope.visibility)
        .bind(scope.status)
        .bind(scope.max_capacity)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Change a scope's ceiling. Returns false if the scope does not exist.
    pub async fn set_capacity(
        &mut self,
        scope_id: ScopeId,
        max_capacity: Option<u32>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE scopes SET max_capacity = ? WHERE id = ?")
            .bind(max_capacity)
            .bind(scope_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Change a scope's lifecycle status. Returns false if the scope does not exist.
    pub async fn set_status(
        &mut self,
        scope_id: ScopeId,
        status: ScopeStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE scopes SET status = ? WHERE id = ?")
            .bind(status)
            .bind(scope_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_lookup() {
        let db = Database::new(":memory:").await.unwrap();
        let mut uow = db.begin().await.unwrap();
        let scope = Scope::new(
            42,
            "Sunday hike",
            ScopeKind::Event,
            Visibility::GroupRestricted,
            Some(12),
        );
        uow.scopes().upsert(&scope).await.unwrap();
        uow.commit().await.unwrap();

        let lookup = SqliteScopeLookup::new(db.clone());
        let found = lookup.get(42).await.unwrap().unwrap();
        assert_eq!(found, scope);
        assert!(lookup.get(43).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capacity_and_status_updates() {
        let db = Database::new(":memory:").await.unwrap();
        let mut uow = db.begin().await.unwrap();
        uow.scopes()
            .upsert(&Scope::new(1, "chess", ScopeKind::Group, Visibility::Public, Some(2)))
            .await
            .unwrap();

        assert!(uow.scopes().set_capacity(1, None).await.unwrap());
        assert!(uow.scopes().set_status(1, ScopeStatus::Canceled).await.unwrap());
        assert!(!uow.scopes().set_capacity(99, Some(1)).await.unwrap());

        let scope = uow.scopes().find(1).await.unwrap().unwrap();
        assert_eq!(scope.max_capacity, None);
        assert!(!scope.is_active());
    }

    #[test]
    fn only_public_skips_review() {
        assert!(!Visibility::Public.requires_review());
        assert!(Visibility::Private.requires_review());
        assert!(Visibility::GroupRestricted.requires_review());
    }
}

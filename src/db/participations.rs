use async_trait::async_trait;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::authz::{ParticipationSource, RoleSet};
use crate::db::row_parsers::db_participation_from_row;
use crate::errors::AppResult;
use crate::models::participation::DbParticipation;
use crate::utils::utc_now;

const PARTICIPATION_SELECT: &str = "SELECT p.member_id, m.username, p.scope, p.resource, p.roles, p.created_at, p.updated_at \
     FROM participations p JOIN members m ON m.id = p.member_id";

/// Participation records stored in the `participations` table.
#[derive(Clone)]
pub struct SqliteParticipations {
    pool: SqlitePool,
}

impl SqliteParticipations {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipationSource for SqliteParticipations {
    async fn participation_roles(
        &self,
        member_id: Uuid,
        scope: &str,
        resource: &str,
    ) -> AppResult<Option<RoleSet>> {
        Ok(fetch_participation(&self.pool, member_id, scope, resource)
            .await?
            .map(|participation| participation.roles))
    }
}

pub async fn fetch_participation(
    pool: &SqlitePool,
    member_id: Uuid,
    scope: &str,
    resource: &str,
) -> AppResult<Option<DbParticipation>> {
    let sql = format!("{PARTICIPATION_SELECT} WHERE p.member_id = ? AND p.scope = ? AND p.resource = ?");
    let row = sqlx::query(&sql)
        .bind(member_id.to_string())
        .bind(scope)
        .bind(resource)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_participation_from_row).transpose()
}

pub async fn list_participants(pool: &SqlitePool, scope: &str, resource: &str) -> AppResult<Vec<DbParticipation>> {
    let sql = format!("{PARTICIPATION_SELECT} WHERE p.scope = ? AND p.resource = ? ORDER BY m.username");
    let rows = sqlx::query(&sql)
        .bind(scope)
        .bind(resource)
        .fetch_all(pool)
        .await?;

    rows.iter().map(db_participation_from_row).collect()
}

/// Stores `roles` for the member on the resource. An empty set removes the record.
pub async fn save_participation_roles<'e, E>(
    executor: E,
    member_id: Uuid,
    scope: &str,
    resource: &str,
    roles: &RoleSet,
) -> AppResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    if roles.is_empty() {
        sqlx::query("DELETE FROM participations WHERE member_id = ? AND scope = ? AND resource = ?")
            .bind(member_id.to_string())
            .bind(scope)
            .bind(resource)
            .execute(executor)
            .await?;
        return Ok(());
    }

    let now = utc_now();
    sqlx::query(
        r#"
        INSERT INTO participations (member_id, scope, resource, roles, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(member_id, scope, resource) DO UPDATE SET roles = excluded.roles, updated_at = excluded.updated_at
        "#,
    )
    .bind(member_id.to_string())
    .bind(scope)
    .bind(resource)
    .bind(roles.to_json())
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn delete_resource_participations<'e, E>(executor: E, scope: &str, resource: &str) -> AppResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM participations WHERE scope = ? AND resource = ?")
        .bind(scope)
        .bind(resource)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

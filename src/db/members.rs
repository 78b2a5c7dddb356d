use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::RoleSet;
use crate::db::row_parsers::db_member_from_row;
use crate::errors::AppResult;
use crate::models::member::DbMember;
use crate::utils::utc_now;

const MEMBER_COLUMNS: &str = "id, username, name, email, password_hash, roles, created_at, updated_at";

pub async fn fetch_member_by_id(pool: &SqlitePool, member_id: Uuid) -> AppResult<Option<DbMember>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(member_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_member_from_row).transpose()
}

pub async fn fetch_member_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<DbMember>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE username = ?");
    let row = sqlx::query(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_member_from_row).transpose()
}

pub async fn list_members(pool: &SqlitePool) -> AppResult<Vec<DbMember>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members ORDER BY username");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(db_member_from_row).collect()
}

pub async fn update_member_roles(pool: &SqlitePool, member_id: Uuid, roles: &RoleSet) -> AppResult<()> {
    sqlx::query("UPDATE members SET roles = ?, updated_at = ? WHERE id = ?")
        .bind(roles.to_json())
        .bind(utc_now())
        .bind(member_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

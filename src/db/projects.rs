use sqlx::SqlitePool;

use crate::db::row_parsers::db_project_from_row;
use crate::errors::{AppError, AppResult};
use crate::models::project::DbProject;

const PROJECT_COLUMNS: &str = "id, slug, name, description, owner_id, created_at, updated_at";

pub async fn fetch_project_by_slug(pool: &SqlitePool, slug: &str) -> AppResult<DbProject> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?");
    let row = sqlx::query(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    db_project_from_row(&row)
}

pub async fn list_projects(pool: &SqlitePool) -> AppResult<Vec<DbProject>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(db_project_from_row).collect()
}

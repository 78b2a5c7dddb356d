use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::RoleSet;
use crate::errors::AppError;
use crate::models::{member::DbMember, participation::DbParticipation, project::DbProject};

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

pub fn db_member_from_row(row: &SqliteRow) -> Result<DbMember, AppError> {
    let id_s: String = column(row, "id")?;
    let username: String = column(row, "username")?;
    let name: String = column(row, "name")?;
    let email: String = column(row, "email")?;
    let password_hash: String = column(row, "password_hash")?;
    let roles_s: String = column(row, "roles")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    Ok(DbMember {
        id: parse_uuid(&id_s)?,
        username,
        name,
        email,
        password_hash,
        roles: RoleSet::from_json(&roles_s)?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn db_project_from_row(row: &SqliteRow) -> Result<DbProject, AppError> {
    let id_s: String = column(row, "id")?;
    let slug: String = column(row, "slug")?;
    let name: String = column(row, "name")?;
    let description: Option<String> = column(row, "description")?;
    let owner_id_s: Option<String> = column(row, "owner_id")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    let owner_id = match owner_id_s {
        Some(s) => Some(parse_uuid(&s)?),
        None => None,
    };

    Ok(DbProject {
        id: parse_uuid(&id_s)?,
        slug,
        name,
        description,
        owner_id,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

/// Expects the participation columns plus the member's `username`.
pub fn db_participation_from_row(row: &SqliteRow) -> Result<DbParticipation, AppError> {
    let member_id_s: String = column(row, "member_id")?;
    let username: String = column(row, "username")?;
    let scope: String = column(row, "scope")?;
    let resource: String = column(row, "resource")?;
    let roles_s: String = column(row, "roles")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    Ok(DbParticipation {
        member_id: parse_uuid(&member_id_s)?,
        username,
        scope,
        resource,
        roles: RoleSet::from_json(&roles_s)?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_datetime_formats() {
        assert!(parse_datetime("2025-11-19T12:34:56Z").is_ok());
        assert!(parse_datetime("2025-11-19 12:34:56").is_ok());
        assert!(parse_datetime("2025-11-19").is_ok());
        assert!(parse_datetime("yesterday").is_err());
    }
}

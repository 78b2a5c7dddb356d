use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, scopes, MaybeMember, RoleSet};
use crate::db::participations::{delete_resource_participations, save_participation_roles};
use crate::db::projects::{self as project_store, fetch_project_by_slug};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::models::project::{Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::utils::{utc_now, validate_handle};

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "List projects", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(State(state): State<AppState>) -> AppResult<Json<Vec<Project>>> {
    let projects = project_store::list_projects(&state.pool).await?;
    Ok(Json(projects.into_iter().map(Project::from).collect()))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created, a signed-in creator is its owner", body = Project),
        (status = 409, description = "Slug already taken")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    actor: MaybeMember,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    validate_handle("slug", &payload.slug)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE slug = ?")
        .bind(&payload.slug)
        .fetch_one(&state.pool)
        .await?;
    if taken > 0 {
        return Err(AppError::conflict("slug already taken"));
    }

    let now = utc_now();
    let project_id = Uuid::new_v4();
    let owner_id = actor.member_id();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, slug, name, description, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id.to_string())
    .bind(&payload.slug)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(owner_id.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // anonymous creation (access control off) leaves the project without an owner
    if let Some(owner_id) = owner_id {
        let owner_roles: RoleSet = [roles::PROJECT_OWNER].into_iter().collect();
        save_participation_roles(&mut *tx, owner_id, scopes::PROJECT, &payload.slug, &owner_roles).await?;
    }

    tx.commit().await?;

    let project: Project = fetch_project_by_slug(&state.pool, &payload.slug).await?.into();

    tracing::info!(project_id = %project.id, slug = %project.slug, owner_id = ?owner_id, "project created");
    log_activity_with_context(
        &state.event_bus,
        "created",
        owner_id,
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{project_slug}",
    tag = "Projects",
    params(("project_slug" = String, Path, description = "Project slug")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_slug): Path<String>,
) -> AppResult<Json<Project>> {
    let project = fetch_project_by_slug(&state.pool, &project_slug).await?;
    Ok(Json(project.into()))
}

#[utoipa::path(
    put,
    path = "/projects/{project_slug}",
    tag = "Projects",
    params(("project_slug" = String, Path, description = "Project slug")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    actor: MaybeMember,
    headers: HeaderMap,
    Path(project_slug): Path<String>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let existing = fetch_project_by_slug(&state.pool, &project_slug).await?;

    let name = payload.name.unwrap_or_else(|| existing.name.clone());
    if name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let description = payload.description.or_else(|| existing.description.clone());

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(utc_now())
        .bind(existing.id.to_string())
        .execute(&state.pool)
        .await?;

    let updated: Project = fetch_project_by_slug(&state.pool, &project_slug).await?.into();
    let old: Project = existing.into();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        actor.member_id(),
        &updated,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_slug}",
    tag = "Projects",
    params(("project_slug" = String, Path, description = "Project slug")),
    responses(
        (status = 204, description = "Project and its participations deleted"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    actor: MaybeMember,
    Path(project_slug): Path<String>,
) -> AppResult<StatusCode> {
    let existing: Project = fetch_project_by_slug(&state.pool, &project_slug).await?.into();

    let mut tx = state.pool.begin().await?;
    let removed = delete_resource_participations(&mut *tx, scopes::PROJECT, &project_slug).await?;
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(existing.id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(project_id = %existing.id, participations = removed, "project deleted");
    log_activity(&state.event_bus, "deleted", actor.member_id(), &existing);

    Ok(StatusCode::NO_CONTENT)
}

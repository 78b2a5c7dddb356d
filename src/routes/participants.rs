//! Project participants and their project-scope roles.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::authz::{scopes, AuthzMode, MaybeMember, Principal, RoleChange, RoleSet};
use crate::db::members::fetch_member_by_username;
use crate::db::participations::{self as participation_store, fetch_participation, save_participation_roles};
use crate::db::projects::fetch_project_by_slug;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::participation::Participation;
use crate::models::rbac::{role_change_action, RoleAssignment, RoleChangeRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{project_slug}/participants",
    tag = "Participants",
    params(("project_slug" = String, Path, description = "Project slug")),
    responses(
        (status = 200, description = "Participants with their project roles", body = [Participation]),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_participants(
    State(state): State<AppState>,
    Path(project_slug): Path<String>,
) -> AppResult<Json<Vec<Participation>>> {
    fetch_project_by_slug(&state.pool, &project_slug).await?;
    let participants = participation_store::list_participants(&state.pool, scopes::PROJECT, &project_slug).await?;
    Ok(Json(participants.into_iter().map(Participation::from).collect()))
}

#[utoipa::path(
    post,
    path = "/projects/{project_slug}/participants/{username}/roles",
    operation_id = "grant_participant_role",
    tag = "Participants",
    params(
        ("project_slug" = String, Path, description = "Project slug"),
        ("username" = String, Path, description = "Member username")
    ),
    request_body = RoleChangeRequest,
    responses(
        (status = 200, description = "Role granted", body = Participation),
        (status = 400, description = "Unknown project role"),
        (status = 403, description = "Actor does not outrank the role or the participant")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_role(
    State(state): State<AppState>,
    MaybeMember(actor): MaybeMember,
    Path((project_slug, username)): Path<(String, String)>,
    Json(payload): Json<RoleChangeRequest>,
) -> AppResult<Json<Participation>> {
    change_project_role(&state, actor.as_ref(), &project_slug, &username, &payload.role, RoleChange::Add)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::internal("participation missing after grant"))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_slug}/participants/{username}/roles/{role}",
    operation_id = "revoke_participant_role",
    tag = "Participants",
    params(
        ("project_slug" = String, Path, description = "Project slug"),
        ("username" = String, Path, description = "Member username"),
        ("role" = String, Path, description = "Project-scope role name")
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 403, description = "Actor does not outrank the participant"),
        (status = 404, description = "Participant does not hold the role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    MaybeMember(actor): MaybeMember,
    Path((project_slug, username, role)): Path<(String, String, String)>,
) -> AppResult<StatusCode> {
    change_project_role(&state, actor.as_ref(), &project_slug, &username, &role, RoleChange::Remove).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Applies the change and returns the participation left afterwards.
async fn change_project_role(
    state: &AppState,
    actor: Option<&Principal>,
    project_slug: &str,
    username: &str,
    role: &str,
    change: RoleChange,
) -> AppResult<Option<Participation>> {
    fetch_project_by_slug(&state.pool, project_slug).await?;
    let target = fetch_member_by_username(&state.pool, username)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))?;

    let acting_roles = match actor {
        Some(actor) if state.gate.mode() == AuthzMode::Strict => state
            .participations
            .participation_roles(actor.member_id, scopes::PROJECT, project_slug)
            .await?
            .unwrap_or_default(),
        _ => RoleSet::new(),
    };
    let actor_id = actor.map(|actor| actor.member_id);
    let target_roles = fetch_participation(&state.pool, target.id, scopes::PROJECT, project_slug)
        .await?
        .map(|p| p.roles)
        .unwrap_or_default();

    state
        .gate
        .authorize_role_change(scopes::PROJECT, &acting_roles, &target_roles, role, change)?;

    let mut roles = target_roles;
    let changed = match change {
        RoleChange::Add => roles.insert(role),
        RoleChange::Remove => roles.remove(role),
    };
    if !changed && change == RoleChange::Remove {
        return Err(AppError::not_found(format!("{username} does not hold role '{role}' on {project_slug}")));
    }

    if changed {
        save_participation_roles(&state.pool, target.id, scopes::PROJECT, project_slug, &roles).await?;

        let assignment = RoleAssignment {
            member_id: target.id,
            scope: scopes::PROJECT.to_string(),
            resource: Some(project_slug.to_string()),
            role: role.to_string(),
            actor_id,
            occurred_at: utc_now(),
        };
        tracing::info!(
            member_id = %target.id,
            actor_id = ?actor_id,
            project = %project_slug,
            role = %role,
            change = ?change,
            "project role changed"
        );
        log_activity(&state.event_bus, role_change_action(change), actor_id, &assignment);
    }

    Ok(fetch_participation(&state.pool, target.id, scopes::PROJECT, project_slug)
        .await?
        .map(Participation::from))
}

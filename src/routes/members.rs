//! Member directory and general-scope role assignment.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app::AppState;
use crate::authz::{scopes, MaybeMember, Principal, RoleChange, RoleSet};
use crate::db::members::{self as member_store, fetch_member_by_username, update_member_roles};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::models::member::{DbMember, Member, MemberUpdateRequest};
use crate::models::rbac::{role_change_action, RoleAssignment, RoleChangeRequest};
use crate::routes::auth::ensure_email_free_for;
use crate::utils::{hash_password, utc_now};

#[utoipa::path(
    get,
    path = "/members",
    tag = "Members",
    responses(
        (status = 200, description = "All members", body = Vec<Member>),
        (status = 403, description = "Missing member.list")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_members(State(state): State<AppState>) -> AppResult<Json<Vec<Member>>> {
    let members = member_store::list_members(&state.pool).await?;
    Ok(Json(members.into_iter().map(Member::from).collect()))
}

#[utoipa::path(
    get,
    path = "/members/{username}",
    tag = "Members",
    params(("username" = String, Path, description = "Member username")),
    responses(
        (status = 200, description = "Member", body = Member),
        (status = 404, description = "Member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_member(State(state): State<AppState>, Path(username): Path<String>) -> AppResult<Json<Member>> {
    let member = require_member(&state, &username).await?;
    Ok(Json(member.into()))
}

#[utoipa::path(
    put,
    path = "/members/{username}",
    tag = "Members",
    params(("username" = String, Path, description = "Member username")),
    request_body = MemberUpdateRequest,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 403, description = "Member outranks the actor"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_member(
    State(state): State<AppState>,
    actor: MaybeMember,
    headers: HeaderMap,
    Path(username): Path<String>,
    Json(payload): Json<MemberUpdateRequest>,
) -> AppResult<Json<Member>> {
    let existing = require_member(&state, &username).await?;
    ensure_outranks(&state, actor.0.as_ref(), &existing)?;

    if let Some(email) = &payload.email {
        ensure_email_free_for(&state.pool, email, existing.id).await?;
    }

    let name = payload.name.unwrap_or_else(|| existing.name.clone());
    let email = payload.email.unwrap_or_else(|| existing.email.clone());
    let password_hash = match payload.password.as_deref() {
        Some(password) => hash_password(password)?,
        None => existing.password_hash.clone(),
    };

    sqlx::query("UPDATE members SET name = ?, email = ?, password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(password_hash)
        .bind(utc_now())
        .bind(existing.id.to_string())
        .execute(&state.pool)
        .await?;

    let updated: Member = require_member(&state, &username).await?.into();
    let old: Member = existing.into();

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
    path = "/members/{username}",
    tag = "Members",
    params(("username" = String, Path, description = "Member username")),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 403, description = "Member outranks the actor"),
        (status = 404, description = "Member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_member(
    State(state): State<AppState>,
    actor: MaybeMember,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    let existing = require_member(&state, &username).await?;
    ensure_outranks(&state, actor.0.as_ref(), &existing)?;
    let existing: Member = existing.into();

    // participations go with the member (ON DELETE CASCADE)
    sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(existing.id.to_string())
        .execute(&state.pool)
        .await?;

    tracing::info!(member_id = %existing.id, actor_id = ?actor.member_id(), "member deleted");
    log_activity(&state.event_bus, "deleted", actor.member_id(), &existing);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/members/{username}/roles",
    tag = "Members",
    params(("username" = String, Path, description = "Member username")),
    request_body = RoleChangeRequest,
    responses(
        (status = 200, description = "Role granted", body = Member),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Actor does not outrank the role or the member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_role(
    State(state): State<AppState>,
    MaybeMember(actor): MaybeMember,
    Path(username): Path<String>,
    Json(payload): Json<RoleChangeRequest>,
) -> AppResult<Json<Member>> {
    change_general_role(&state, actor.as_ref(), &username, &payload.role, RoleChange::Add).await
}

#[utoipa::path(
    delete,
    path = "/members/{username}/roles/{role}",
    tag = "Members",
    params(
        ("username" = String, Path, description = "Member username"),
        ("role" = String, Path, description = "General-scope role name")
    ),
    responses(
        (status = 200, description = "Role revoked", body = Member),
        (status = 403, description = "Actor does not outrank the member"),
        (status = 404, description = "Member does not hold the role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    MaybeMember(actor): MaybeMember,
    Path((username, role)): Path<(String, String)>,
) -> AppResult<Json<Member>> {
    change_general_role(&state, actor.as_ref(), &username, &role, RoleChange::Remove).await
}

async fn change_general_role(
    state: &AppState,
    actor: Option<&Principal>,
    username: &str,
    role: &str,
    change: RoleChange,
) -> AppResult<Json<Member>> {
    let target = require_member(state, username).await?;

    let no_roles = RoleSet::new();
    let acting_roles = actor.map_or(&no_roles, |actor| &actor.roles);
    state
        .gate
        .authorize_role_change(scopes::GENERAL, acting_roles, &target.roles, role, change)?;
    let actor_id = actor.map(|actor| actor.member_id);

    let mut roles = target.roles.clone();
    let changed = match change {
        RoleChange::Add => roles.insert(role),
        RoleChange::Remove => roles.remove(role),
    };
    if !changed {
        return match change {
            RoleChange::Add => Ok(Json(target.into())),
            RoleChange::Remove => Err(AppError::not_found(format!("{username} does not hold role '{role}'"))),
        };
    }

    update_member_roles(&state.pool, target.id, &roles).await?;

    let assignment = RoleAssignment {
        member_id: target.id,
        scope: scopes::GENERAL.to_string(),
        resource: None,
        role: role.to_string(),
        actor_id,
        occurred_at: utc_now(),
    };
    tracing::info!(
        member_id = %target.id,
        actor_id = ?actor_id,
        role = %role,
        change = ?change,
        "general role changed"
    );
    log_activity(&state.event_bus, role_change_action(change), actor_id, &assignment);

    let updated = require_member(state, username).await?;
    Ok(Json(updated.into()))
}

/// Editing or deleting someone else requires outranking them in the general scope.
fn ensure_outranks(state: &AppState, actor: Option<&Principal>, target: &DbMember) -> AppResult<()> {
    match actor {
        Some(actor) if actor.member_id == target.id => Ok(()),
        Some(actor) => state
            .gate
            .authorize_member_change(scopes::GENERAL, &actor.roles, &target.roles),
        None => state
            .gate
            .authorize_member_change(scopes::GENERAL, &RoleSet::new(), &target.roles),
    }
}

async fn require_member(state: &AppState, username: &str) -> AppResult<DbMember> {
    fetch_member_by_username(&state.pool, username)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))
}

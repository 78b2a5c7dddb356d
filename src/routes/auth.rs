use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{roles, CurrentMember, RoleSet};
use crate::db::members::{fetch_member_by_id, fetch_member_by_username};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context, RequestContext};
use crate::models::member::{AuthResponse, LoginRequest, Member, RegisterRequest};
use crate::utils::{hash_password, utc_now, validate_username, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Member registered", body = AuthResponse),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    validate_username(&payload.username)?;
    ensure_identity_available(&state.pool, &payload.username, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let member_id = Uuid::new_v4();
    let roles: RoleSet = [roles::MEMBER].into_iter().collect();

    sqlx::query(
        "INSERT INTO members (id, username, name, email, password_hash, roles, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(member_id.to_string())
    .bind(&payload.username)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(roles.to_json())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let member: Member = fetch_member_by_id(&state.pool, member_id)
        .await?
        .ok_or_else(|| AppError::internal("registered member not found"))?
        .into();
    let token = state.jwt.encode(member.id)?;

    tracing::info!(member_id = %member.id, username = %member.username, "member registered");
    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(member.id),
        &member,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, member })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_member = fetch_member_by_username(&state.pool, &payload.username)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_member.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_member.id)?;
    let member: Member = db_member.into();
    log_activity(&state.event_bus, "login", Some(member.id), &member);

    Ok(Json(AuthResponse { token, member }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current member", body = Member),
        (status = 401, description = "Not logged in")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, CurrentMember(principal): CurrentMember) -> AppResult<Json<Member>> {
    let member = fetch_member_by_id(&state.pool, principal.member_id)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))?;
    Ok(Json(member.into()))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(_current: CurrentMember) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

async fn ensure_identity_available(pool: &SqlitePool, username: &str, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM members WHERE username = ? OR email = ?")
        .bind(username)
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("username or email already in use"));
    }

    Ok(())
}

/// Fails with 409 when another member already uses `email`.
pub(crate) async fn ensure_email_free_for(pool: &SqlitePool, email: &str, member_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM members WHERE email = ? AND id != ?")
        .bind(email)
        .bind(member_id.to_string())
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

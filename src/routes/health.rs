use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::AuthzMode;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// "strict" or "off"
    pub access_control: &'static str,
    pub scopes: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_check = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let (db_ok, db_error) = match db_check {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    let access_control = match state.gate.mode() {
        AuthzMode::Strict => "strict",
        AuthzMode::Off => "off",
    };

    Ok(Json(HealthResponse {
        status: "ok",
        db_ok,
        db_error,
        access_control,
        scopes: state.gate.catalog().scope_names().map(String::from).collect(),
    }))
}

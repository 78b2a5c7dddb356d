use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::authz::RoleCatalog;

#[utoipa::path(
    get,
    path = "/access/catalog",
    tag = "Access",
    responses(
        (status = 200, description = "Scopes, roles and permissions in effect", body = RoleCatalog),
        (status = 403, description = "Missing role.view")
    ),
    security(("bearerAuth" = []))
)]
pub async fn catalog(State(state): State<AppState>) -> Json<RoleCatalog> {
    Json(state.gate.catalog().clone())
}

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{
    default_strategies, permissions as perm, roles, scopes, AccessConfig, AccessGate, AccessLayer,
    AccessRule, AuthzMode, ConfigError, ParticipationSource, RoleCatalog,
};
use crate::db::participations::SqliteParticipations;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{access, auth, health, members, participants, projects};
use crate::session::{JwtSession, SessionBoundary};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub gate: Arc<AccessGate>,
    pub session: Arc<dyn SessionBoundary>,
    pub participations: Arc<dyn ParticipationSource>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtConfig,
        catalog: RoleCatalog,
        mode: AuthzMode,
        event_bus: EventBus,
    ) -> Result<Self, AppError> {
        ensure_builtin_roles(&catalog)?;

        let jwt = Arc::new(jwt);
        let gate = AccessGate::new(Arc::new(catalog), default_strategies(), mode)?;

        Ok(Self {
            session: Arc::new(JwtSession::new(jwt.clone(), pool.clone())),
            participations: Arc::new(SqliteParticipations::new(pool.clone())),
            gate: Arc::new(gate),
            pool,
            jwt,
            event_bus,
        })
    }

    /// Registers `rule` for the route at `path` and returns the layer enforcing it.
    pub fn protect(&self, path: &str, rule: AccessRule) -> Result<AccessLayer, ConfigError> {
        let registered = self.gate.register(path, rule)?;
        Ok(AccessLayer::new(
            self.gate.clone(),
            self.session.clone(),
            self.participations.clone(),
            registered,
        ))
    }
}

/// Roles the handlers hand out on their own must exist in the catalog.
fn ensure_builtin_roles(catalog: &RoleCatalog) -> Result<(), AppError> {
    for (scope, role) in [(scopes::GENERAL, roles::MEMBER), (scopes::PROJECT, roles::PROJECT_OWNER)] {
        let known = catalog.scope(scope).and_then(|s| s.role(role)).is_some();
        if !known {
            return Err(AppError::configuration(format!(
                "role catalog must define role '{role}' in scope '{scope}'"
            )));
        }
    }
    Ok(())
}

pub async fn create_app(pool: SqlitePool, catalog: RoleCatalog) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let access = AccessConfig::from_env()?;
    create_app_with(pool, catalog, jwt_config, access.mode)
}

pub fn create_app_with(
    pool: SqlitePool,
    catalog: RoleCatalog,
    jwt_config: JwtConfig,
    mode: AuthzMode,
) -> Result<Router, AppError> {
    let (event_bus, rx) = init_event_bus();
    let state = AppState::new(pool.clone(), jwt_config, catalog, mode, event_bus)?;

    tracing::info!(mode = ?mode, scopes = ?state.gate.catalog().scope_names().collect::<Vec<_>>(), "access control ready");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let general = |permission: &str| AccessRule::new().require(scopes::GENERAL, permission);

    const MEMBERS: &str = "/members";
    const MEMBER: &str = "/members/:username";
    const MEMBER_ROLES: &str = "/members/:username/roles";
    const MEMBER_ROLE: &str = "/members/:username/roles/:role";

    let member_routes = Router::new()
        .route(MEMBERS, get(members::list_members).route_layer(state.protect(MEMBERS, general(perm::MEMBER_LIST))?))
        .route(
            MEMBER,
            get(members::get_member)
                .route_layer(state.protect(MEMBER, general(perm::MEMBER_VIEW).allow_self_action())?),
        )
        .route(
            MEMBER,
            put(members::update_member)
                .route_layer(state.protect(MEMBER, general(perm::MEMBER_UPDATE).allow_self_action())?),
        )
        .route(
            MEMBER,
            delete(members::delete_member)
                .route_layer(state.protect(MEMBER, general(perm::MEMBER_DELETE).allow_self_action())?),
        )
        .route(
            MEMBER_ROLES,
            post(members::grant_role).route_layer(state.protect(MEMBER_ROLES, general(perm::ROLE_ASSIGN))?),
        )
        .route(
            MEMBER_ROLE,
            delete(members::revoke_role).route_layer(state.protect(MEMBER_ROLE, general(perm::ROLE_ASSIGN))?),
        );

    const PROJECTS: &str = "/projects";
    const PROJECT: &str = "/projects/:project_slug";
    const PARTICIPANTS: &str = "/projects/:project_slug/participants";
    const PARTICIPANT_ROLES: &str = "/projects/:project_slug/participants/:username/roles";
    const PARTICIPANT_ROLE: &str = "/projects/:project_slug/participants/:username/roles/:role";

    let general_or_project = |permission: &str| {
        AccessRule::new()
            .require(scopes::GENERAL, permission)
            .require(scopes::PROJECT, permission)
    };
    let project = |permission: &str| AccessRule::new().require(scopes::PROJECT, permission);

    let project_routes = Router::new()
        .route(
            PROJECTS,
            get(projects::list_projects).route_layer(state.protect(PROJECTS, general(perm::PROJECT_LIST))?),
        )
        .route(
            PROJECTS,
            post(projects::create_project).route_layer(state.protect(PROJECTS, general(perm::PROJECT_CREATE))?),
        )
        .route(
            PROJECT,
            get(projects::get_project).route_layer(state.protect(PROJECT, general_or_project(perm::PROJECT_VIEW))?),
        )
        .route(
            PROJECT,
            put(projects::update_project)
                .route_layer(state.protect(PROJECT, general_or_project(perm::PROJECT_UPDATE))?),
        )
        .route(
            PROJECT,
            delete(projects::delete_project)
                .route_layer(state.protect(PROJECT, general_or_project(perm::PROJECT_DELETE))?),
        )
        .route(
            PARTICIPANTS,
            get(participants::list_participants).route_layer(state.protect(
                PARTICIPANTS,
                project(perm::PARTICIPANT_LIST).require(scopes::GENERAL, perm::PROJECT_VIEW),
            )?),
        )
        .route(
            PARTICIPANT_ROLES,
            post(participants::grant_role)
                .route_layer(state.protect(PARTICIPANT_ROLES, project(perm::PARTICIPANT_MANAGE))?),
        )
        .route(
            PARTICIPANT_ROLE,
            delete(participants::revoke_role)
                .route_layer(state.protect(PARTICIPANT_ROLE, project(perm::PARTICIPANT_MANAGE))?),
        );

    const CATALOG: &str = "/access/catalog";

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route(CATALOG, get(access::catalog).route_layer(state.protect(CATALOG, general(perm::ROLE_VIEW))?))
        .nest("/auth", auth_routes)
        .merge(member_routes)
        .merge(project_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tokio::spawn(start_activity_listener(rx, pool));

    Ok(router)
}

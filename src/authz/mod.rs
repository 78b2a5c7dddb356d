//! Authorization module - scoped role catalog, policy checks and middleware
//!
//! This module implements the scoped RBAC engine with support for:
//! - Independent scopes (general, per-project, per-workshop) with their own roles
//! - Privilege levels where the catalog minimum is a superuser tier
//! - Per-scope role resolution (own roles vs. participation records)
//! - Self-action bypass and OR-combined scope requirements
//! - Configurable enforcement mode (off/strict)

mod catalog;
mod error;
mod evaluator;
mod gate;
mod middleware;
mod principal;
mod resolution;
mod role_set;

pub use catalog::{CatalogDocument, Role, RoleCatalog, RoleDocument, Scope, ScopeDocument};
pub use error::{ConfigError, ConfigResult};
pub use evaluator::{has_permission, has_priority, validate_permission_declared};
pub use gate::{AccessGate, AccessRule, Decision, RegisteredRule, RoleChange, SELF_PARAM};
pub use middleware::{AccessLayer, AccessMiddleware, CurrentMember, MaybeMember};
pub use principal::{route_params, Principal, RouteContext};
pub use resolution::{ParticipationSource, ScopeStrategy, StaticParticipations, StrategyTable};
pub use role_set::RoleSet;

use std::path::PathBuf;

use crate::errors::AppError;

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzMode {
    /// No permission checks (open deployments)
    Off,
    /// Reject unauthenticated and unauthorized requests
    Strict,
}

impl AuthzMode {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "" | "strict" => Ok(AuthzMode::Strict),
            "off" => Ok(AuthzMode::Off),
            other => Err(AppError::configuration(format!(
                "AUTHZ_MODE must be 'strict' or 'off', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub mode: AuthzMode,
    pub roles_file: PathBuf,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mode = AuthzMode::parse(&std::env::var("AUTHZ_MODE").unwrap_or_default())?;
        let roles_file = std::env::var("ROLES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/roles.yaml"));

        Ok(Self { mode, roles_file })
    }

    pub fn load_catalog(&self) -> Result<RoleCatalog, AppError> {
        RoleCatalog::load(&self.roles_file).map_err(|err| {
            AppError::configuration(format!("{}: {err}", self.roles_file.display()))
        })
    }
}

/// Well-known scope names
pub mod scopes {
    pub const GENERAL: &str = "general";
    pub const PROJECT: &str = "project";
    pub const WORKSHOP: &str = "workshop";
}

/// Route parameters read by the resource-scoped strategies
pub mod params {
    pub const PROJECT: &str = "project_slug";
    pub const WORKSHOP: &str = "workshop_slug";
}

/// Well-known role names
pub mod roles {
    pub const SYSADMIN: &str = "sysadmin";
    pub const MEMBER: &str = "member";
    pub const PROJECT_OWNER: &str = "owner";
}

/// Well-known permission names
pub mod permissions {
    // Member
    pub const MEMBER_LIST: &str = "member.list";
    pub const MEMBER_VIEW: &str = "member.view";
    pub const MEMBER_UPDATE: &str = "member.update";
    pub const MEMBER_DELETE: &str = "member.delete";

    // Project
    pub const PROJECT_LIST: &str = "project.list";
    pub const PROJECT_CREATE: &str = "project.create";
    pub const PROJECT_VIEW: &str = "project.view";
    pub const PROJECT_UPDATE: &str = "project.update";
    pub const PROJECT_DELETE: &str = "project.delete";

    // Participation
    pub const PARTICIPANT_LIST: &str = "participant.list";
    pub const PARTICIPANT_MANAGE: &str = "participant.manage";

    // Roles
    pub const ROLE_VIEW: &str = "role.view";
    pub const ROLE_ASSIGN: &str = "role.assign";
}

/// The strategy table for the scopes this service ships with.
pub fn default_strategies() -> StrategyTable {
    StrategyTable::new()
        .principal(scopes::GENERAL)
        .resource(scopes::PROJECT, params::PROJECT)
        .resource(scopes::WORKSHOP, params::WORKSHOP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults_to_strict() {
        assert_eq!(AuthzMode::parse("").unwrap(), AuthzMode::Strict);
        assert_eq!(AuthzMode::parse("OFF").unwrap(), AuthzMode::Off);
        assert!(AuthzMode::parse("advisory").is_err());
    }

    #[test]
    fn default_strategies_cover_bundled_catalog() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/roles.yaml");
        let catalog = RoleCatalog::load(path).unwrap();
        assert!(default_strategies().validate(&catalog).is_ok());
    }
}

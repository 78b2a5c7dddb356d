use std::sync::Arc;

use super::catalog::RoleCatalog;
use super::error::{ConfigError, ConfigResult};
use super::evaluator::{has_permission, has_priority, validate_permission_declared};
use super::principal::{route_params, Principal, RouteContext};
use super::resolution::{ParticipationSource, StrategyTable};
use super::role_set::RoleSet;
use super::AuthzMode;
use crate::errors::AppError;

/// Default route parameter compared against the principal for self-action.
pub const SELF_PARAM: &str = "username";

/// Declaration of what a protected route requires.
///
/// Requirements are OR-combined in declaration order.
#[derive(Debug, Clone, Default)]
pub struct AccessRule {
    requirements: Vec<(String, String)>,
    allow_self_action: bool,
    self_param: Option<String>,
}

impl AccessRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, scope: impl Into<String>, permission: impl Into<String>) -> Self {
        self.requirements.push((scope.into(), permission.into()));
        self
    }

    /// Let a member act on their own record, identified by the `username` route parameter.
    pub fn allow_self_action(mut self) -> Self {
        self.allow_self_action = true;
        self
    }

    pub fn allow_self_action_on(mut self, param: impl Into<String>) -> Self {
        self.allow_self_action = true;
        self.self_param = Some(param.into());
        self
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }
}

/// An [`AccessRule`] validated against the catalog for one route.
#[derive(Debug, Clone)]
pub struct RegisteredRule {
    route: String,
    requirements: Vec<(String, String)>,
    self_param: Option<String>,
}

impl RegisteredRule {
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }

    pub fn allows_self_action(&self) -> bool {
        self.self_param.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Access control is switched off.
    Bypassed,
    SelfAction,
    Granted { scope: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Add,
    Remove,
}

/// Enforcement point shared by every protected route.
#[derive(Debug)]
pub struct AccessGate {
    catalog: Arc<RoleCatalog>,
    strategies: StrategyTable,
    mode: AuthzMode,
}

impl AccessGate {
    pub fn new(catalog: Arc<RoleCatalog>, strategies: StrategyTable, mode: AuthzMode) -> ConfigResult<Self> {
        strategies.validate(&catalog)?;
        Ok(Self {
            catalog,
            strategies,
            mode,
        })
    }

    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    pub fn mode(&self) -> AuthzMode {
        self.mode
    }

    /// Validates `rule` for the route `path` (axum syntax, `:param` segments).
    pub fn register(&self, path: &str, rule: AccessRule) -> ConfigResult<RegisteredRule> {
        if rule.requirements.is_empty() {
            return Err(ConfigError::EmptyRule(path.to_string()));
        }

        let declared = route_params(path);

        for (scope, permission) in &rule.requirements {
            let strategy = self
                .strategies
                .get(scope)
                .filter(|_| self.catalog.scope(scope).is_some())
                .ok_or_else(|| ConfigError::UnknownScope(scope.clone()))?;

            if !validate_permission_declared(&self.catalog, scope, permission) {
                return Err(ConfigError::UndeclaredPermission {
                    scope: scope.clone(),
                    permission: permission.clone(),
                });
            }

            strategy.validate_endpoint_shape(scope, path, &declared)?;
        }

        let self_param = if rule.allow_self_action {
            let param = rule.self_param.unwrap_or_else(|| SELF_PARAM.to_string());
            if !declared.contains(&param.as_str()) {
                return Err(ConfigError::MissingRouteParam {
                    route: path.to_string(),
                    scope: "self".to_string(),
                    param,
                });
            }
            Some(param)
        } else {
            None
        };

        tracing::debug!(route = %path, requirements = ?rule.requirements, "registered protected route");

        Ok(RegisteredRule {
            route: path.to_string(),
            requirements: rule.requirements,
            self_param,
        })
    }

    /// Decides whether `principal` may run the operation protected by `rule`.
    pub async fn authorize(
        &self,
        rule: &RegisteredRule,
        principal: Option<&Principal>,
        route: &RouteContext,
        participations: &dyn ParticipationSource,
    ) -> Result<Decision, AppError> {
        if self.mode == AuthzMode::Off {
            return Ok(Decision::Bypassed);
        }

        let principal = principal.ok_or_else(|| AppError::unauthorized("login required"))?;

        if let Some(param) = &rule.self_param {
            if route.param(param) == Some(principal.username.as_str()) {
                tracing::debug!(member_id = %principal.member_id, route = %rule.route, "self-action allowed");
                return Ok(Decision::SelfAction);
            }
        }

        for (scope, permission) in &rule.requirements {
            let roles = self
                .strategies
                .resolve(scope, principal, route, participations)
                .await?;

            if has_permission(&self.catalog, scope, &roles, permission) {
                tracing::debug!(
                    member_id = %principal.member_id,
                    scope = %scope,
                    permission = %permission,
                    "permission granted"
                );
                return Ok(Decision::Granted { scope: scope.clone() });
            }
        }

        tracing::info!(
            member_id = %principal.member_id,
            route = %rule.route,
            requirements = ?rule.requirements,
            "permission denied"
        );
        Err(AppError::forbidden("insufficient permissions"))
    }

    /// Guards granting or revoking `role` in `scope`.
    ///
    /// The actor must outrank the role itself and every role the target
    /// currently holds. Unknown roles are rejected in every mode.
    pub fn authorize_role_change(
        &self,
        scope: &str,
        acting_roles: &RoleSet,
        target_roles: &RoleSet,
        role: &str,
        change: RoleChange,
    ) -> Result<(), AppError> {
        let scope_def = self
            .catalog
            .scope(scope)
            .ok_or_else(|| AppError::bad_request(format!("unknown scope '{scope}'")))?;
        if scope_def.role(role).is_none() {
            return Err(AppError::bad_request(format!("unknown role '{role}' in scope '{scope}'")));
        }
        if self.mode == AuthzMode::Off {
            return Ok(());
        }

        let allowed = match change {
            RoleChange::Add => {
                has_priority(&self.catalog, scope, acting_roles, [role])
                    && has_priority(&self.catalog, scope, acting_roles, target_roles)
            }
            RoleChange::Remove => {
                let mut held = target_roles.clone();
                held.insert(role);
                has_priority(&self.catalog, scope, acting_roles, &held)
            }
        };

        if allowed {
            Ok(())
        } else {
            tracing::info!(
                scope = %scope,
                role = %role,
                change = ?change,
                acting = %acting_roles,
                target = %target_roles,
                "role change denied"
            );
            Err(AppError::forbidden(format!("not allowed to manage role '{role}'")))
        }
    }

    /// Guards one member editing or removing another member's record.
    ///
    /// The actor must outrank every role the target holds in `scope`.
    pub fn authorize_member_change(
        &self,
        scope: &str,
        acting_roles: &RoleSet,
        target_roles: &RoleSet,
    ) -> Result<(), AppError> {
        if self.mode == AuthzMode::Off || has_priority(&self.catalog, scope, acting_roles, target_roles) {
            return Ok(());
        }
        tracing::info!(
            scope = %scope,
            acting = %acting_roles,
            target = %target_roles,
            "member change denied"
        );
        Err(AppError::forbidden("not allowed to manage a member who outranks you"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::resolution::StaticParticipations;
    use uuid::Uuid;

    fn catalog() -> Arc<RoleCatalog> {
        Arc::new(
            RoleCatalog::from_yaml_str(
                r#"
scopes:
  - name: general
    roles:
      - {name: sysadmin, level: 0, permissions: [member.view, member.update, project.update]}
      - {name: admin, level: 5, permissions: [member.view, member.update]}
      - {name: moderator, level: 5, permissions: [member.view]}
      - {name: member, level: 10, permissions: [member.view]}
  - name: project
    roles:
      - {name: owner, level: 1, permissions: [project.update]}
      - {name: contributor, level: 10, permissions: [project.view]}
"#,
            )
            .unwrap(),
        )
    }

    fn gate(mode: AuthzMode) -> AccessGate {
        let strategies = StrategyTable::new()
            .principal("general")
            .resource("project", "project_slug");
        AccessGate::new(catalog(), strategies, mode).unwrap()
    }

    fn roles(names: &[&str]) -> RoleSet {
        names.iter().copied().collect()
    }

    #[test]
    fn gate_requires_full_strategy_coverage() {
        let err = AccessGate::new(catalog(), StrategyTable::new().principal("general"), AuthzMode::Strict)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStrategy(_)));
    }

    #[test]
    fn registration_rejects_unknown_scope() {
        let err = gate(AuthzMode::Strict)
            .register("/workshops/:slug", AccessRule::new().require("workshop", "member.view"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScope(ref scope) if scope == "workshop"));
    }

    #[test]
    fn registration_rejects_undeclared_permission() {
        let err = gate(AuthzMode::Strict)
            .register("/members", AccessRule::new().require("general", "member.vew"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UndeclaredPermission { .. }));
    }

    #[test]
    fn registration_rejects_missing_resource_param() {
        let err = gate(AuthzMode::Strict)
            .register("/projects", AccessRule::new().require("project", "project.update"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRouteParam { ref param, .. } if param == "project_slug"));
    }

    #[test]
    fn registration_rejects_self_action_without_identity_param() {
        let err = gate(AuthzMode::Strict)
            .register(
                "/members",
                AccessRule::new().require("general", "member.view").allow_self_action(),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRouteParam { ref param, .. } if param == "username"));
    }

    #[test]
    fn registration_rejects_empty_rule() {
        let err = gate(AuthzMode::Strict).register("/members", AccessRule::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRule(_)));
    }

    #[tokio::test]
    async fn unauthenticated_is_rejected() {
        let gate = gate(AuthzMode::Strict);
        let rule = gate
            .register("/members", AccessRule::new().require("general", "member.view"))
            .unwrap();
        let err = gate
            .authorize(&rule, None, &RouteContext::new(), &StaticParticipations::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn disabled_mode_skips_everything() {
        let gate = gate(AuthzMode::Off);
        let rule = gate
            .register("/members", AccessRule::new().require("general", "member.update"))
            .unwrap();
        let decision = gate
            .authorize(&rule, None, &RouteContext::new(), &StaticParticipations::new())
            .await
            .unwrap();
        assert_eq!(decision, Decision::Bypassed);
    }

    #[tokio::test]
    async fn self_action_short_circuits_scope_checks() {
        let gate = gate(AuthzMode::Strict);
        let rule = gate
            .register(
                "/members/:username",
                AccessRule::new().require("general", "member.update").allow_self_action(),
            )
            .unwrap();
        let alice = Principal::new(Uuid::new_v4(), "alice");

        let own = RouteContext::new().with_param("username", "alice");
        let decision = gate
            .authorize(&rule, Some(&alice), &own, &StaticParticipations::new())
            .await
            .unwrap();
        assert_eq!(decision, Decision::SelfAction);

        let other = RouteContext::new().with_param("username", "bob");
        let err = gate
            .authorize(&rule, Some(&alice), &other, &StaticParticipations::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn self_action_requires_declaration() {
        let gate = gate(AuthzMode::Strict);
        let rule = gate
            .register("/members/:username", AccessRule::new().require("general", "member.update"))
            .unwrap();
        let alice = Principal::new(Uuid::new_v4(), "alice");
        let own = RouteContext::new().with_param("username", "alice");

        let err = gate
            .authorize(&rule, Some(&alice), &own, &StaticParticipations::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn scopes_are_or_combined() {
        let gate = gate(AuthzMode::Strict);
        let rule = gate
            .register(
                "/projects/:project_slug",
                AccessRule::new()
                    .require("general", "project.update")
                    .require("project", "project.update"),
            )
            .unwrap();
        let route = RouteContext::new().with_param("project_slug", "proj1");
        let participations = StaticParticipations::new();

        let admin = Principal::new(Uuid::new_v4(), "root").with_roles(["sysadmin"]);
        let decision = gate.authorize(&rule, Some(&admin), &route, &participations).await.unwrap();
        assert_eq!(decision, Decision::Granted { scope: "general".into() });

        let owner = Principal::new(Uuid::new_v4(), "olive").with_roles(["member"]);
        participations
            .insert(owner.member_id, "project", "proj1", ["owner"])
            .unwrap();
        let decision = gate.authorize(&rule, Some(&owner), &route, &participations).await.unwrap();
        assert_eq!(decision, Decision::Granted { scope: "project".into() });

        let contributor = Principal::new(Uuid::new_v4(), "carl").with_roles(["member"]);
        participations
            .insert(contributor.member_id, "project", "proj1", ["contributor"])
            .unwrap();
        let err = gate
            .authorize(&rule, Some(&contributor), &route, &participations)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_stored_role_degrades_to_denial() {
        let gate = gate(AuthzMode::Strict);
        let rule = gate
            .register("/members", AccessRule::new().require("general", "member.view"))
            .unwrap();
        let principal = Principal::new(Uuid::new_v4(), "typo").with_roles(["sysadmn"]);
        let err = gate
            .authorize(&rule, Some(&principal), &RouteContext::new(), &StaticParticipations::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn role_grant_requires_priority_over_role_and_target() {
        let gate = gate(AuthzMode::Strict);

        assert!(gate
            .authorize_role_change("general", &roles(&["admin"]), &roles(&["member"]), "member", RoleChange::Add)
            .is_ok());
        // lateral grant
        assert!(matches!(
            gate.authorize_role_change("general", &roles(&["admin"]), &roles(&[]), "moderator", RoleChange::Add),
            Err(AppError::Forbidden(_))
        ));
        // target already outranks or equals the actor
        assert!(matches!(
            gate.authorize_role_change("general", &roles(&["admin"]), &roles(&["moderator"]), "member", RoleChange::Add),
            Err(AppError::Forbidden(_))
        ));
        assert!(gate
            .authorize_role_change("general", &roles(&["sysadmin"]), &roles(&["sysadmin"]), "admin", RoleChange::Add)
            .is_ok());
    }

    #[test]
    fn role_revoke_requires_priority_over_everything_held() {
        let gate = gate(AuthzMode::Strict);

        assert!(gate
            .authorize_role_change("general", &roles(&["admin"]), &roles(&["member"]), "member", RoleChange::Remove)
            .is_ok());
        assert!(matches!(
            gate.authorize_role_change(
                "general",
                &roles(&["admin"]),
                &roles(&["member", "moderator"]),
                "member",
                RoleChange::Remove
            ),
            Err(AppError::Forbidden(_))
        ));
        // members cannot strip their own roles unless superuser
        assert!(matches!(
            gate.authorize_role_change("general", &roles(&["member"]), &roles(&["member"]), "member", RoleChange::Remove),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn role_change_rejects_unknown_role() {
        let gate = gate(AuthzMode::Strict);
        assert!(matches!(
            gate.authorize_role_change("general", &roles(&["sysadmin"]), &roles(&[]), "owner", RoleChange::Add),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn role_change_in_off_mode_only_checks_the_role_exists() {
        let gate = gate(AuthzMode::Off);
        assert!(gate
            .authorize_role_change("general", &roles(&[]), &roles(&["sysadmin"]), "admin", RoleChange::Add)
            .is_ok());
        assert!(matches!(
            gate.authorize_role_change("general", &roles(&[]), &roles(&[]), "owner", RoleChange::Add),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn member_changes_require_outranking_the_target() {
        let gate = gate(AuthzMode::Strict);
        assert!(gate
            .authorize_member_change("general", &roles(&["admin"]), &roles(&["member"]))
            .is_ok());
        assert!(gate.authorize_member_change("general", &roles(&["admin"]), &roles(&[])).is_ok());
        assert!(matches!(
            gate.authorize_member_change("general", &roles(&["admin"]), &roles(&["sysadmin"])),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            gate.authorize_member_change("general", &roles(&["admin"]), &roles(&["admin"])),
            Err(AppError::Forbidden(_))
        ));

        let open = self::gate(AuthzMode::Off);
        assert!(open
            .authorize_member_change("general", &roles(&[]), &roles(&["sysadmin"]))
            .is_ok());
    }
}

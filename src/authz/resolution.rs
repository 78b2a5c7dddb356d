//! Per-scope role resolution.
//!
//! Each catalog scope is bound to exactly one [`ScopeStrategy`]. The general
//! scope reads the principal's own roles; resource scopes read the
//! participation record linking the principal to the resource named by a
//! route parameter.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::catalog::RoleCatalog;
use super::error::{ConfigError, ConfigResult};
use super::principal::{Principal, RouteContext};
use super::role_set::RoleSet;
use crate::errors::AppError;

/// Lookup of per-resource participation roles.
#[async_trait]
pub trait ParticipationSource: Send + Sync {
    /// Roles recorded for `member_id` on `resource` within `scope`, or `None`
    /// when the member does not participate.
    async fn participation_roles(
        &self,
        member_id: Uuid,
        scope: &str,
        resource: &str,
    ) -> Result<Option<RoleSet>, AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeStrategy {
    /// The principal's own role list.
    Principal,
    /// Roles on the participation record for the resource named by `param`.
    Resource { param: String },
}

impl ScopeStrategy {
    pub fn resource(param: impl Into<String>) -> Self {
        Self::Resource { param: param.into() }
    }

    /// Rejects routes that cannot supply what this strategy reads.
    pub fn validate_endpoint_shape(&self, scope: &str, route: &str, declared: &[&str]) -> ConfigResult<()> {
        match self {
            ScopeStrategy::Principal => Ok(()),
            ScopeStrategy::Resource { param } => {
                if declared.contains(&param.as_str()) {
                    Ok(())
                } else {
                    Err(ConfigError::MissingRouteParam {
                        route: route.to_string(),
                        scope: scope.to_string(),
                        param: param.clone(),
                    })
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    strategies: BTreeMap<String, ScopeStrategy>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn principal(self, scope: impl Into<String>) -> Self {
        self.with(scope, ScopeStrategy::Principal)
    }

    pub fn resource(self, scope: impl Into<String>, param: impl Into<String>) -> Self {
        self.with(scope, ScopeStrategy::resource(param))
    }

    pub fn with(mut self, scope: impl Into<String>, strategy: ScopeStrategy) -> Self {
        self.strategies.insert(scope.into(), strategy);
        self
    }

    pub fn get(&self, scope: &str) -> Option<&ScopeStrategy> {
        self.strategies.get(scope)
    }

    /// Every catalog scope needs a strategy and every strategy a catalog scope.
    pub fn validate(&self, catalog: &RoleCatalog) -> ConfigResult<()> {
        for scope in catalog.scope_names() {
            if !self.strategies.contains_key(scope) {
                return Err(ConfigError::MissingStrategy(scope.to_string()));
            }
        }
        for scope in self.strategies.keys() {
            if catalog.scope(scope).is_none() {
                return Err(ConfigError::UnknownScope(scope.clone()));
            }
        }
        Ok(())
    }

    pub async fn resolve(
        &self,
        scope: &str,
        principal: &Principal,
        route: &RouteContext,
        participations: &dyn ParticipationSource,
    ) -> Result<RoleSet, AppError> {
        match self.strategies.get(scope) {
            None => {
                tracing::warn!(scope = %scope, "no strategy for scope, resolving to no roles");
                Ok(RoleSet::new())
            }
            Some(ScopeStrategy::Principal) => Ok(principal.roles.clone()),
            Some(ScopeStrategy::Resource { param }) => {
                let Some(resource) = route.param(param) else {
                    tracing::warn!(scope = %scope, param = %param, "route parameter missing at request time");
                    return Ok(RoleSet::new());
                };
                let roles = participations
                    .participation_roles(principal.member_id, scope, resource)
                    .await?;
                Ok(roles.unwrap_or_default())
            }
        }
    }
}

/// In-memory participation records, for tests and fixed deployments.
#[derive(Debug, Default)]
pub struct StaticParticipations {
    records: RwLock<HashMap<(Uuid, String, String), RoleSet>>,
}

impl StaticParticipations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(
        &self,
        member_id: Uuid,
        scope: &str,
        resource: &str,
        roles: impl IntoIterator<Item = S>,
    ) -> Result<(), AppError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| AppError::internal("participation records lock poisoned"))?;
        records.insert(
            (member_id, scope.to_string(), resource.to_string()),
            roles.into_iter().collect(),
        );
        Ok(())
    }
}

#[async_trait]
impl ParticipationSource for StaticParticipations {
    async fn participation_roles(
        &self,
        member_id: Uuid,
        scope: &str,
        resource: &str,
    ) -> Result<Option<RoleSet>, AppError> {
        let records = self
            .records
            .read()
            .map_err(|_| AppError::internal("participation records lock poisoned"))?;
        Ok(records
            .get(&(member_id, scope.to_string(), resource.to_string()))
            .cloned())
    }
}

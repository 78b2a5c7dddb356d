use std::collections::HashMap;

use uuid::Uuid;

use super::role_set::RoleSet;

/// The authenticated member for the duration of one request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub member_id: Uuid,
    pub username: String,
    /// Roles held in the general scope.
    pub roles: RoleSet,
}

impl Principal {
    pub fn new(member_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            member_id,
            username: username.into(),
            roles: RoleSet::new(),
        }
    }

    pub fn with_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Path parameters of the matched route, e.g. `project_slug` or `username`.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    params: HashMap<String, String>,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for RouteContext {
    fn from(params: HashMap<String, String>) -> Self {
        Self { params }
    }
}

/// Names of the `:param` segments declared in an axum route path.
pub fn route_params(path: &str) -> Vec<&str> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':').or_else(|| segment.strip_prefix('*')))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_declared_route_params() {
        assert_eq!(
            route_params("/projects/:project_slug/participants/:username/roles/:role"),
            vec!["project_slug", "username", "role"]
        );
        assert!(route_params("/projects").is_empty());
        assert_eq!(route_params("/files/*path"), vec!["path"]);
    }

    #[test]
    fn principal_roles_builder() {
        let principal = Principal::new(Uuid::new_v4(), "alice").with_roles(["member"]);
        assert!(principal.has_role("member"));
        assert!(!principal.has_role("sysadmin"));
    }

    #[test]
    fn route_context_lookup() {
        let route = RouteContext::new().with_param("username", "alice");
        assert_eq!(route.param("username"), Some("alice"));
        assert_eq!(route.param("project_slug"), None);
    }
}

//! Role catalog: the immutable set of scopes and roles loaded at startup.
//!
//! Source format (YAML):
//!
//! ```yaml
//! scopes:
//!   - name: general
//!     roles:
//!       - name: sysadmin
//!         level: 0
//!         permissions: [member.view, member.update]
//! ```
//!
//! `privilege` is accepted as an alias of `level`. Unknown keys, missing keys,
//! duplicate names and empty lists are rejected.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{ConfigError, ConfigResult};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    pub scopes: Vec<ScopeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeDocument {
    pub name: String,
    pub roles: Vec<RoleDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleDocument {
    pub name: String,
    #[serde(alias = "privilege")]
    pub level: u32,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Role {
    pub name: String,
    /// Lower is more authority.
    pub level: u32,
    #[schema(value_type = Vec<String>)]
    pub permissions: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Role {
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_superuser(&self, superuser_level: u32) -> bool {
        self.level <= superuser_level
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Scope {
    pub name: String,
    roles: Vec<Role>,
}

impl Scope {
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        let found = self.roles.iter().find(|role| role.name == name);
        if found.is_none() {
            tracing::debug!(scope = %self.name, role = %name, "role not found in scope");
        }
        found
    }

    /// Every permission granted by at least one role of this scope.
    pub fn permissions(&self) -> BTreeSet<&str> {
        self.roles
            .iter()
            .flat_map(|role| role.permissions.iter().map(String::as_str))
            .collect()
    }

    pub fn declares(&self, permission: &str) -> bool {
        self.roles.iter().any(|role| role.grants(permission))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleCatalog {
    scopes: Vec<Scope>,
    superuser_level: u32,
}

impl RoleCatalog {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            scopes = catalog.scopes.len(),
            "role catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let document: CatalogDocument = serde_yaml::from_str(content)?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> ConfigResult<Self> {
        if document.scopes.is_empty() {
            return Err(ConfigError::invalid("catalog declares no scopes"));
        }

        let mut scope_names = HashSet::new();
        let mut scopes = Vec::with_capacity(document.scopes.len());

        for scope_doc in document.scopes {
            if scope_doc.name.trim().is_empty() {
                return Err(ConfigError::invalid("scope name cannot be empty"));
            }
            if !scope_names.insert(scope_doc.name.clone()) {
                return Err(ConfigError::DuplicateScope(scope_doc.name));
            }
            scopes.push(build_scope(scope_doc)?);
        }

        let superuser_level = scopes
            .iter()
            .flat_map(|scope| scope.roles.iter().map(|role| role.level))
            .min()
            .unwrap_or(0);

        Ok(Self {
            scopes,
            superuser_level,
        })
    }

    pub fn scope(&self, name: &str) -> Option<&Scope> {
        let found = self.scopes.iter().find(|scope| scope.name == name);
        if found.is_none() {
            tracing::debug!(scope = %name, "scope not found in catalog");
        }
        found
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(|scope| scope.name.as_str())
    }

    /// Minimum privilege level across the whole catalog.
    pub fn superuser_level(&self) -> u32 {
        self.superuser_level
    }
}

fn build_scope(doc: ScopeDocument) -> ConfigResult<Scope> {
    if doc.roles.is_empty() {
        return Err(ConfigError::invalid(format!("scope '{}' declares no roles", doc.name)));
    }

    let mut role_names = HashSet::new();
    let mut roles = Vec::with_capacity(doc.roles.len());

    for role_doc in doc.roles {
        if role_doc.name.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "role name cannot be empty in scope '{}'",
                doc.name
            )));
        }
        if !role_names.insert(role_doc.name.clone()) {
            return Err(ConfigError::DuplicateRole {
                scope: doc.name,
                role: role_doc.name,
            });
        }

        let mut permissions = BTreeSet::new();
        for permission in role_doc.permissions {
            if permission.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "empty permission on role '{}' in scope '{}'",
                    role_doc.name, doc.name
                )));
            }
            if !permissions.insert(permission.clone()) {
                return Err(ConfigError::DuplicatePermission {
                    scope: doc.name,
                    role: role_doc.name,
                    permission,
                });
            }
        }

        roles.push(Role {
            name: role_doc.name,
            level: role_doc.level,
            permissions,
            description: role_doc.description,
        });
    }

    Ok(Scope { name: doc.name, roles })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
scopes:
  - name: general
    roles:
      - name: sysadmin
        level: 0
        permissions: [read, write]
      - name: member
        privilege: 10
        permissions: [read]
  - name: project
    roles:
      - name: owner
        level: 1
        permissions: [update]
"#;

    #[test]
    fn builds_scopes_and_roles() {
        let catalog = RoleCatalog::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(catalog.scope_names().collect::<Vec<_>>(), vec!["general", "project"]);

        let general = catalog.scope("general").unwrap();
        assert_eq!(general.roles().len(), 2);
        assert_eq!(general.role("member").unwrap().level, 10);
        assert!(general.role("sysadmin").unwrap().grants("write"));
        assert_eq!(catalog.superuser_level(), 0);
    }

    #[test]
    fn lookups_miss_softly() {
        let catalog = RoleCatalog::from_yaml_str(SAMPLE).unwrap();
        assert!(catalog.scope("workshop").is_none());
        assert!(catalog.scope("general").unwrap().role("ghost").is_none());
    }

    #[test]
    fn scope_permissions_are_the_union_of_its_roles() {
        let catalog = RoleCatalog::from_yaml_str(SAMPLE).unwrap();
        let general = catalog.scope("general").unwrap();
        assert_eq!(general.permissions().into_iter().collect::<Vec<_>>(), vec!["read", "write"]);
        assert!(general.declares("write"));
        assert!(!general.declares("update"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = RoleCatalog::from_yaml_str("scopes: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn rejects_missing_level() {
        let src = "scopes:\n  - name: general\n    roles:\n      - name: member\n        permissions: [read]\n";
        assert!(matches!(RoleCatalog::from_yaml_str(src), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_missing_permissions() {
        let src = "scopes:\n  - name: general\n    roles:\n      - name: member\n        level: 3\n";
        assert!(matches!(RoleCatalog::from_yaml_str(src), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_permissions_that_are_not_a_string_list() {
        let src = "scopes:\n  - name: general\n    roles:\n      - name: member\n        level: 3\n        permissions: read\n";
        assert!(matches!(RoleCatalog::from_yaml_str(src), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_negative_level() {
        let src = "scopes:\n  - name: general\n    roles:\n      - name: member\n        level: -1\n        permissions: []\n";
        assert!(matches!(RoleCatalog::from_yaml_str(src), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_unknown_keys() {
        let src = "scopes:\n  - name: general\n    rolez: []\n";
        assert!(matches!(RoleCatalog::from_yaml_str(src), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn rejects_duplicate_role_names() {
        let src = "scopes:\n  - name: general\n    roles:\n      - {name: member, level: 3, permissions: []}\n      - {name: member, level: 4, permissions: []}\n";
        assert!(matches!(
            RoleCatalog::from_yaml_str(src),
            Err(ConfigError::DuplicateRole { ref role, .. }) if role == "member"
        ));
    }

    #[test]
    fn rejects_duplicate_scope_names() {
        let src = "scopes:\n  - name: general\n    roles:\n      - {name: a, level: 1, permissions: []}\n  - name: general\n    roles:\n      - {name: b, level: 1, permissions: []}\n";
        assert!(matches!(
            RoleCatalog::from_yaml_str(src),
            Err(ConfigError::DuplicateScope(ref scope)) if scope == "general"
        ));
    }

    #[test]
    fn rejects_repeated_permission_on_a_role() {
        let src = "scopes:\n  - name: general\n    roles:\n      - {name: a, level: 1, permissions: [read, read]}\n";
        assert!(matches!(
            RoleCatalog::from_yaml_str(src),
            Err(ConfigError::DuplicatePermission { .. })
        ));
    }

    #[test]
    fn rejects_empty_documents() {
        assert!(matches!(RoleCatalog::from_yaml_str("scopes: []"), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            RoleCatalog::from_yaml_str("scopes:\n  - name: general\n    roles: []\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn loads_bundled_catalog() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/roles.yaml");
        let catalog = RoleCatalog::load(path).unwrap();
        assert!(catalog.scope("general").is_some());
        assert!(catalog.scope("project").is_some());
        assert!(catalog.scope("workshop").is_some());
    }
}

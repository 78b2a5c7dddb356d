//! Permission and priority checks over a [`RoleCatalog`].
//!
//! Unknown scopes and role names never raise here: they grant nothing.
//! Declarations are validated against the catalog at registration time
//! instead.

use super::catalog::{Role, RoleCatalog, Scope};

/// Whether any of `role_names` grants `permission` within `scope`.
///
/// Superuser-tier roles hold every permission their scope declares.
pub fn has_permission<S: AsRef<str>>(
    catalog: &RoleCatalog,
    scope: &str,
    role_names: impl IntoIterator<Item = S>,
    permission: &str,
) -> bool {
    let Some(scope_def) = catalog.scope(scope) else {
        tracing::warn!(scope = %scope, permission = %permission, "permission check against unknown scope");
        return false;
    };

    resolve_roles(scope_def, role_names).into_iter().any(|role| {
        role.grants(permission)
            || (role.is_superuser(catalog.superuser_level()) && scope_def.declares(permission))
    })
}

/// Whether the subject's authority within `scope` strictly exceeds the target's.
///
/// Ties are broken in the subject's favour only at the superuser tier, so a
/// superuser can always manage roles while two equally ranked principals
/// cannot manage each other.
pub fn has_priority<S: AsRef<str>, T: AsRef<str>>(
    catalog: &RoleCatalog,
    scope: &str,
    subject_roles: impl IntoIterator<Item = S>,
    target_roles: impl IntoIterator<Item = T>,
) -> bool {
    let Some(scope_def) = catalog.scope(scope) else {
        tracing::warn!(scope = %scope, "priority check against unknown scope");
        return false;
    };

    let Some(subject_best) = best_level(&resolve_roles(scope_def, subject_roles)) else {
        return false;
    };
    let Some(target_best) = best_level(&resolve_roles(scope_def, target_roles)) else {
        return true;
    };

    if subject_best <= catalog.superuser_level() {
        return true;
    }

    subject_best < target_best
}

/// Whether some role in `scope` grants `permission`. Used when routes are
/// registered to catch typos in declarations.
pub fn validate_permission_declared(catalog: &RoleCatalog, scope: &str, permission: &str) -> bool {
    catalog
        .scope(scope)
        .map(|scope_def| scope_def.declares(permission))
        .unwrap_or(false)
}

fn resolve_roles<S: AsRef<str>>(scope: &Scope, role_names: impl IntoIterator<Item = S>) -> Vec<&Role> {
    role_names
        .into_iter()
        .filter_map(|name| scope.role(name.as_ref()))
        .collect()
}

fn best_level(roles: &[&Role]) -> Option<u32> {
    roles.iter().map(|role| role.level).min()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> RoleCatalog {
        RoleCatalog::from_yaml_str(
            r#"
scopes:
  - name: general
    roles:
      - {name: sysadmin, level: 0, permissions: [read, write]}
      - {name: root, level: 0, permissions: []}
      - {name: admin, level: 5, permissions: [read, write]}
      - {name: moderator, level: 5, permissions: [read]}
      - {name: member, level: 10, permissions: [read]}
  - name: project
    roles:
      - {name: owner, level: 1, permissions: [update, view]}
      - {name: contributor, level: 10, permissions: [view]}
"#,
        )
        .unwrap()
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn concrete_general_scenario() {
        let catalog = catalog();
        assert!(!has_permission(&catalog, "general", ["member"], "write"));
        assert!(has_permission(&catalog, "general", ["sysadmin"], "write"));
        assert!(has_priority(&catalog, "general", ["sysadmin"], ["member"]));
        assert!(!has_priority(&catalog, "general", ["member"], ["sysadmin"]));
        assert!(has_priority(&catalog, "general", ["sysadmin"], ["sysadmin"]));
    }

    #[test]
    fn undeclared_permission_is_never_granted() {
        let catalog = catalog();
        for roles in [vec!["sysadmin"], vec!["root", "admin"], vec!["member", "ghost"], vec![]] {
            assert!(!has_permission(&catalog, "general", &roles, "delete"));
        }
    }

    #[test]
    fn granted_permission_survives_unrelated_names() {
        let catalog = catalog();
        assert!(has_permission(&catalog, "general", ["member"], "read"));
        assert!(has_permission(&catalog, "general", ["ghost", "member", "owner"], "read"));
    }

    #[test]
    fn superuser_holds_every_declared_permission() {
        let catalog = catalog();
        assert!(has_permission(&catalog, "general", ["root"], "write"));
        assert!(!has_permission(&catalog, "general", ["root"], "update"));
    }

    #[test]
    fn roles_do_not_leak_across_scopes() {
        let catalog = catalog();
        assert!(!has_permission(&catalog, "project", ["sysadmin"], "update"));
        assert!(has_permission(&catalog, "project", ["owner"], "update"));
    }

    #[test]
    fn unknown_scope_grants_nothing() {
        let catalog = catalog();
        assert!(!has_permission(&catalog, "workshop", ["sysadmin"], "read"));
        assert!(!has_priority(&catalog, "workshop", ["sysadmin"], NONE));
    }

    #[test]
    fn empty_subject_never_has_priority() {
        let catalog = catalog();
        assert!(!has_priority(&catalog, "general", NONE, ["member"]));
        assert!(!has_priority(&catalog, "general", NONE, NONE));
        assert!(!has_priority(&catalog, "general", ["ghost"], ["member"]));
    }

    #[test]
    fn empty_target_is_always_outranked() {
        let catalog = catalog();
        assert!(has_priority(&catalog, "general", ["member"], NONE));
        assert!(has_priority(&catalog, "general", ["member"], ["ghost"]));
    }

    #[test]
    fn minimum_tier_outranks_everything_including_itself() {
        let catalog = catalog();
        for target in ["sysadmin", "root", "admin", "member"] {
            assert!(has_priority(&catalog, "general", ["sysadmin"], [target]));
            assert!(has_priority(&catalog, "general", ["root"], [target]));
        }
    }

    #[test]
    fn equal_ordinary_privilege_cannot_escalate_horizontally() {
        let catalog = catalog();
        assert!(!has_priority(&catalog, "general", ["admin"], ["moderator"]));
        assert!(!has_priority(&catalog, "general", ["moderator"], ["admin"]));
        assert!(!has_priority(&catalog, "general", ["admin"], ["admin"]));
    }

    #[test]
    fn best_role_on_each_side_decides() {
        let catalog = catalog();
        assert!(has_priority(&catalog, "general", ["member", "admin"], ["member"]));
        assert!(!has_priority(&catalog, "general", ["admin"], ["member", "moderator"]));
    }

    #[test]
    fn superuser_tier_is_catalog_wide() {
        // owner is the best project role but sits at level 1, above the catalog minimum
        let catalog = catalog();
        assert!(!has_priority(&catalog, "project", ["owner"], ["owner"]));
        assert!(has_priority(&catalog, "project", ["owner"], ["contributor"]));
    }

    #[test]
    fn declared_permission_validation() {
        let catalog = catalog();
        assert!(validate_permission_declared(&catalog, "general", "write"));
        assert!(!validate_permission_declared(&catalog, "general", "update"));
        assert!(!validate_permission_declared(&catalog, "workshop", "read"));
    }
}

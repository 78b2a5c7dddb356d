use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::RoleChange;
use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleChangeRequest {
    #[schema(example = "admin")]
    pub role: String,
}

/// Audit record of a role granted or revoked in some scope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub member_id: Uuid,
    #[schema(example = "general")]
    pub scope: String,
    /// Resource key for per-resource scopes, e.g. a project slug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub role: String,
    /// Absent when access control is off and the request carried no session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl Loggable for RoleAssignment {
    fn entity_type() -> &'static str { "role_assignment" }
    fn subject_id(&self) -> Uuid { self.member_id }
    fn severity(&self) -> Severity { Severity::Critical }

    fn severity_for_action(&self, _action: &str) -> Severity {
        Severity::Critical
    }
}

pub fn role_change_action(change: RoleChange) -> &'static str {
    match change {
        RoleChange::Add => "granted",
        RoleChange::Remove => "revoked",
    }
}

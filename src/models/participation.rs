use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::RoleSet;

/// Roles a member holds on one resource of a per-resource scope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Participation {
    pub member_id: Uuid,
    pub username: String,
    #[schema(example = "project")]
    pub scope: String,
    #[schema(example = "launch-planning")]
    pub resource: String,
    #[schema(value_type = Vec<String>, example = json!(["owner"]))]
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DbParticipation {
    pub member_id: Uuid,
    pub username: String,
    pub scope: String,
    pub resource: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbParticipation> for Participation {
    fn from(value: DbParticipation) -> Self {
        Participation {
            member_id: value.member_id,
            username: value.username,
            scope: value.scope,
            resource: value.resource,
            roles: value.roles,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

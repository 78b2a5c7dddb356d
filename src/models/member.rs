use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::RoleSet;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Roles held in the general scope
    #[schema(value_type = Vec<String>, example = json!(["member"]))]
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Member {
    fn entity_type() -> &'static str { "member" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone)]
pub struct DbMember {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbMember> for Member {
    fn from(value: DbMember) -> Self {
        Member {
            id: value.id,
            username: value.username,
            name: value.name,
            email: value.email,
            roles: value.roles,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub member: Member,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberUpdateRequest {
    #[schema(example = "Ada King")]
    pub name: Option<String>,
    #[schema(example = "ada.king@example.com")]
    pub email: Option<String>,
    pub password: Option<String>,
}

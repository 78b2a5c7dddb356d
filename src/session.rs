//! Session boundary: who is the current principal of a request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sqlx::SqlitePool;

use crate::authz::Principal;
use crate::db::members::fetch_member_by_id;
use crate::errors::AppError;
use crate::jwt::JwtConfig;

#[async_trait]
pub trait SessionBoundary: Send + Sync {
    /// `Ok(None)` when the request carries no session.
    async fn current_principal(&self, headers: &HeaderMap) -> Result<Option<Principal>, AppError>;
}

/// Bearer JWT sessions backed by the members table.
#[derive(Clone)]
pub struct JwtSession {
    jwt: Arc<JwtConfig>,
    pool: SqlitePool,
}

impl JwtSession {
    pub fn new(jwt: Arc<JwtConfig>, pool: SqlitePool) -> Self {
        Self { jwt, pool }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl SessionBoundary for JwtSession {
    async fn current_principal(&self, headers: &HeaderMap) -> Result<Option<Principal>, AppError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        let claims = self.jwt.decode(token)?;

        let Some(member) = fetch_member_by_id(&self.pool, claims.sub).await? else {
            tracing::debug!(member_id = %claims.sub, "session refers to a missing member");
            return Ok(None);
        };

        Ok(Some(Principal {
            member_id: member.id,
            username: member.username,
            roles: member.roles,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}

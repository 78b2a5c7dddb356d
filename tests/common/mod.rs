#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

use memberhub::authz::{AuthzMode, RoleCatalog};
use memberhub::jwt::JwtConfig;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub fn bundled_catalog() -> Result<RoleCatalog> {
    Ok(RoleCatalog::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("config/roles.yaml"))?)
}

pub async fn migrated_pool(dir: &TempDir) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;
    Ok(pool)
}

pub async fn spawn_app(mode: AuthzMode) -> Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let pool = migrated_pool(&dir).await?;
    let app = memberhub::create_app_with(pool.clone(), bundled_catalog()?, JwtConfig::new("test-secret", 1), mode)?;
    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    /// Registers `username` and returns its bearer token.
    pub async fn register(&self, username: &str) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "name": username.to_uppercase(),
                    "email": format!("{username}@example.com"),
                    "password": "password123"
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        Ok(body["token"].as_str().unwrap_or_default().to_string())
    }

    /// Bootstraps a general-scope role straight in the database.
    pub async fn set_general_roles(&self, username: &str, roles: &[&str]) -> Result<()> {
        sqlx::query("UPDATE members SET roles = ? WHERE username = ?")
            .bind(serde_json::to_string(roles)?)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub fn role_names(member: &Value) -> Vec<String> {
    member["roles"]
        .as_array()
        .map(|roles| roles.iter().filter_map(|r| r.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

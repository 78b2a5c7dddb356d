mod common;

use anyhow::Result;
use axum::http::StatusCode;

use memberhub::authz::AuthzMode;

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let app = common::spawn_app(AuthzMode::Strict).await?;

    let (status, v) = app.send("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK, "health endpoint did not return 200");

    assert_eq!(v["db_ok"], true, "expected db_ok: true, got: {}", v);
    assert_eq!(v["access_control"], "strict");
    let scopes: Vec<&str> = v["scopes"].as_array().unwrap().iter().filter_map(|s| s.as_str()).collect();
    assert_eq!(scopes, ["general", "project", "workshop"]);

    Ok(())
}

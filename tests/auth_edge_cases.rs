mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use memberhub::authz::AuthzMode;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let app = common::spawn_app(AuthzMode::Strict).await?;

    // 1. Register with short password
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "short", "name": "Short Pass", "email": "short@example.com", "password": "short"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "short password must be rejected");

    // 2. Username must be URL safe
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "Not Valid", "name": "X", "email": "x@example.com", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 3. Register a valid member, who gets the default general role
    let (status, body) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "valid", "name": "Valid User", "email": "valid@example.com", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(common::role_names(&body["member"]), ["member"]);
    let token = body["token"].as_str().unwrap().to_string();

    // 4. Duplicate username
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "valid", "name": "Again", "email": "other@example.com", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // 5. Login with wrong password
    let (status, _) = app
        .send("POST", "/auth/login", None, Some(json!({"username": "valid", "password": "wrongpassword"})))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "wrong password must be unauthorized");

    // 6. Login with unknown username
    let (status, _) = app
        .send("POST", "/auth/login", None, Some(json!({"username": "nobody", "password": "password123"})))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "unknown member must be unauthorized");

    // 7. Login works and the token identifies the member
    let (status, body) = app
        .send("POST", "/auth/login", None, Some(json!({"username": "valid", "password": "password123"})))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, me) = app.send("GET", "/auth/me", body["token"].as_str(), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "valid");

    // 8. Protected routes without a token or with a forged one
    let (status, _) = app.send("GET", "/projects", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "missing token must be unauthorized");
    let (status, _) = app.send("GET", "/projects", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send("GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("POST", "/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

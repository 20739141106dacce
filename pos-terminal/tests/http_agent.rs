//! Agent-mode HTTP surface via `oneshot`

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use pos_terminal::auth::NewUser;
use pos_terminal::core::build_app;
use pos_terminal::utils::ManualClock;
use pos_terminal::ServerState;
use serde_json::{Value, json};
use shared::Role;
use tower::ServiceExt;

struct Agent {
    app: Router,
    state: ServerState,
    clock: Arc<ManualClock>,
}

async fn agent() -> Agent {
    let clock = Arc::new(ManualClock::at_date("2024-05-01").unwrap());
    let state = ServerState::ephemeral(clock.clone()).await.unwrap();
    for (username, password, role) in [
        ("alice", "Secret1!", Role::Admin),
        ("carol", "till-pass", Role::Cashier),
        ("mike", "mgr-pass", Role::Manager),
    ] {
        state
            .credentials
            .create_user(NewUser {
                username: username.into(),
                password: password.into(),
                role,
            })
            .await
            .unwrap();
    }
    Agent {
        app: build_app(state.clone()),
        state,
        clock,
    }
}

impl Agent {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap();
        self.send(req).await
    }

    async fn token(&self, username: &str, password: &str) -> String {
        let (status, body) = self.login(username, password).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn call(&self, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.send(req).await
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let agent = agent().await;
    let (status, body) = agent
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_response_shape() {
    let agent = agent().await;
    let (status, body) = agent.login("alice", "Secret1!").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 86400);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"]["id"].is_i64());
    assert!(!body["token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_login_failures_are_401() {
    let agent = agent().await;
    let (status, body) = agent.login("alice", "nope").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1002);

    let (status, unknown) = agent.login("nobody", "nope").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["message"], body["message"]);

    // Recorded without the password
    let failed = agent
        .state
        .audit
        .ledger()
        .query(&pos_terminal::audit::AuditQuery {
            action: Some("login_failed".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].additional_info.as_ref().unwrap()["reason"], "invalid_password");
    assert_eq!(failed[1].additional_info.as_ref().unwrap()["reason"], "user_not_found");
    assert!(!serde_json::to_string(&failed).unwrap().contains("nope"));
}

#[tokio::test]
async fn test_missing_and_malformed_headers() {
    let agent = agent().await;

    let (status, body) = agent
        .send(Request::get("/api/users").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1001);

    let req = Request::get("/api/users")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = agent.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1004);

    let (status, body) = agent.call("GET", "/api/users", "not.a.jwt", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1004);
}

#[tokio::test]
async fn test_expired_token_is_401() {
    let agent = agent().await;
    let token = agent.token("alice", "Secret1!").await;

    agent.clock.advance_secs(24 * 60 * 60 + 1);
    let (status, body) = agent.call("GET", "/api/auth/me", &token, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1003);
}

#[tokio::test]
async fn test_permissions_per_route() {
    let agent = agent().await;
    let cashier = agent.token("carol", "till-pass").await;
    let manager = agent.token("mike", "mgr-pass").await;
    let admin = agent.token("alice", "Secret1!").await;

    let (status, body) = agent.call("GET", "/api/users", &cashier, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 2001);
    assert_eq!(body["details"]["required_permission"], "user:manage");

    let (status, body) = agent.call("GET", "/api/users", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    // Managers read the ledger but cannot purge it
    let (status, _) = agent.call("GET", "/api/audit", &manager, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = agent
        .call("DELETE", "/api/audit?older_than_days=30&confirm=true", &manager, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_me_and_logout() {
    let agent = agent().await;
    let token = agent.token("carol", "till-pass").await;

    let (status, me) = agent.call("GET", "/api/auth/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "carol");
    assert_eq!(me["role"], "cashier");
    assert!(me["permissions"].as_array().unwrap().contains(&json!("sale:create")));

    let (status, _) = agent.call("POST", "/api/auth/logout", &token, None).await;
    assert_eq!(status, StatusCode::OK);

    // No revocation: the token keeps working
    let (status, _) = agent.call("GET", "/api/auth/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_admin_over_http() {
    let agent = agent().await;
    let admin = agent.token("alice", "Secret1!").await;

    let (status, created) = agent
        .call("POST", "/api/users", &admin, Some(json!({ "username": "dan", "role": "cashier" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let generated = created["generated_password"].as_str().unwrap().to_string();
    assert_eq!(generated.len(), 16);
    agent.token("dan", &generated).await;

    let (status, body) = agent
        .call("POST", "/api/users", &admin, Some(json!({ "username": "dan", "role": "cashier" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 8002);

    let (status, updated) = agent
        .call("PUT", "/api/users/dan", &admin, Some(json!({ "role": "manager" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "manager");

    let (status, body) = agent
        .call("PUT", "/api/users/alice", &admin, Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 8003);

    let (status, _) = agent
        .call("PUT", "/api/users/ghost", &admin, Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, reset) = agent
        .call("POST", "/api/users/dan/password", &admin, Some(json!({ "password": "new-pass-1" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reset.get("generated_password").is_none());
    agent.token("dan", "new-pass-1").await;
}

#[tokio::test]
async fn test_audit_routes() {
    let agent = agent().await;
    let admin = agent.token("alice", "Secret1!").await;

    let (status, list) = agent
        .call("GET", "/api/audit?action=login", &admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    let id = list["items"][0]["id"].as_i64().unwrap();

    let (status, entry) = agent
        .call("GET", &format!("/api/audit/{id}"), &admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["username"], "alice");
    assert_eq!(entry["timestamp"], "2024-05-01T00:00:00.000Z");

    let (status, _) = agent.call("GET", "/api/audit/99999", &admin, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = agent
        .call("DELETE", "/api/audit?older_than_days=30", &admin, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);

    let (status, export) = agent.call("GET", "/api/audit/export", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["total"], 1);

    let (status, stats) = agent.call("GET", "/api/audit/stats", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["by_action"]["export"], 1);
}

#[tokio::test]
async fn test_sensitive_routes() {
    let agent = agent().await;
    let admin = agent.token("alice", "Secret1!").await;
    let manager = agent.token("mike", "mgr-pass").await;
    let uri = "/api/sensitive/customer/17/card_last4";

    let (status, body) = agent
        .call("PUT", uri, &admin, Some(json!({ "value": "4242" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "created");

    // Read-only role: get works, store does not
    let (status, body) = agent.call("GET", uri, &manager, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], "4242");
    let (status, _) = agent
        .call("PUT", uri, &manager, Some(json!({ "value": "0000" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = agent
        .call("POST", &format!("{uri}/check"), &manager, Some(json!({ "value": "4243" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"], false);

    let (status, list) = agent
        .call("GET", "/api/sensitive/customer/17", &admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["field"], "card_last4");
    assert!(list[0].get("encrypted_value").is_none());

    let (status, _) = agent.call("DELETE", uri, &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = agent.call("GET", uri, &admin, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let agent = agent().await;

    let bad_json = Request::post("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let no_content_type = Request::post("/auth/login")
        .body(Body::from(json!({ "username": "alice", "password": "Secret1!" }).to_string()))
        .unwrap();
    let missing_field = Request::post("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "username": "alice" }).to_string()))
        .unwrap();

    for req in [bad_json, no_content_type, missing_field] {
        let (status, body) = agent.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["code"], 2);
        assert!(body["message"].is_string());
    }

    let token = agent.token("alice", "Secret1!").await;
    let (status, body) = agent
        .call("PUT", "/api/sensitive/customer/1/card", &token, Some(json!({ "val": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);
}

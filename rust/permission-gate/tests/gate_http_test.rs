//! PermissionGate behaviour against a mocked permission API.

use mockito::{Matcher, Mock, Server, ServerGuard};
use permission_gate::{
    GateConfig, GateDecision, GateError, PermissionGate, Requirement, StaticToken, SUPERUSER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

const TOKEN: &str = "test-token";

fn gate_with(config: GateConfig) -> PermissionGate {
    PermissionGate::new(&config, Arc::new(StaticToken::new(TOKEN))).unwrap()
}

fn gate(server: &ServerGuard) -> PermissionGate {
    gate_with(GateConfig::new(&server.url()))
}

async fn mock_check(server: &mut ServerGuard, resource: &str, action: &str, body: &str, hits: usize) -> Mock {
    server
        .mock("GET", "/api/permissions/check")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("resource".into(), resource.into()),
            Matcher::UrlEncoded("action".into(), action.into()),
        ]))
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

async fn mock_me(server: &mut ServerGuard, permissions: &[&str]) -> Mock {
    let body = serde_json::json!({
        "success": true,
        "data": { "id": 7, "email": "board@example.org", "permissions": permissions }
    });
    server
        .mock("GET", "/api/auth/me")
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// Serve one request with `body`, holding the reply back for `delay`.
async fn delayed_server(body: String, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let mut read = 0;
        while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf[read..]).await.unwrap();
            if n == 0 {
                return;
            }
            read += n;
        }

        tokio::time::sleep(delay).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_second_check_within_ttl_uses_cache() {
    let mut server = Server::new_async().await;
    let m = mock_check(
        &mut server,
        "user",
        "read",
        r#"{"success": true, "data": {"allowed": true}}"#,
        1,
    )
    .await;
    let gate = gate(&server);

    let first = gate.check_permission("user", "read").await;
    assert!(first.allowed);
    assert!(!first.cached);

    let second = gate.check_permission("user", "read").await;
    assert!(second.allowed);
    assert!(second.cached);

    m.assert_async().await;
    assert_eq!(gate.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_check_after_ttl_queries_again() {
    let mut server = Server::new_async().await;
    let m = mock_check(
        &mut server,
        "user",
        "read",
        r#"{"success": true, "data": {"allowed": true}}"#,
        2,
    )
    .await;
    let gate = gate_with(GateConfig::new(&server.url()).with_cache_ttl(Duration::from_millis(100)));

    gate.check_permission("user", "read").await;
    assert!(gate.check_permission("user", "read").await.cached);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let third = gate.check_permission("user", "read").await;
    assert!(third.allowed);
    assert!(!third.cached);

    m.assert_async().await;
}

#[tokio::test]
async fn test_denial_is_cached_with_reason() {
    let mut server = Server::new_async().await;
    let m = mock_check(
        &mut server,
        "partner",
        "delete",
        r#"{"success": true, "data": {"allowed": false, "reason": "role lacks partner:delete"}}"#,
        1,
    )
    .await;
    let gate = gate(&server);

    let first = gate.check_permission("partner", "delete").await;
    assert!(!first.allowed);
    assert_eq!(first.reason.as_deref(), Some("role lacks partner:delete"));

    let second = gate.check_permission("partner", "delete").await;
    assert!(!second.allowed);
    assert!(second.cached);

    m.assert_async().await;
}

#[tokio::test]
async fn test_reload_clears_cache() {
    let mut server = Server::new_async().await;
    let check = mock_check(
        &mut server,
        "user",
        "read",
        r#"{"success": true, "data": {"allowed": true}}"#,
        2,
    )
    .await;
    let me = mock_me(&mut server, &["user:read", "contact:read"]).await;
    let gate = gate(&server);

    gate.check_permission("user", "read").await;
    gate.reload().await.unwrap();
    assert_eq!(gate.cache_stats().entries, 0);

    let after = gate.check_permission("user", "read").await;
    assert!(!after.cached);

    check.assert_async().await;
    me.assert_async().await;
}

#[tokio::test]
async fn test_reload_replaces_permissions() {
    let mut server = Server::new_async().await;
    let _me = mock_me(&mut server, &["contact:read", "contact:write"]).await;
    let gate = gate(&server);
    gate.set_permissions(["user:read"]);

    gate.reload().await.unwrap();

    assert!(!gate.has_permission("user:read"));
    assert!(gate.has_all_permissions(&["contact:read", "contact:write"]));
    assert_eq!(gate.permissions(), vec!["contact:read", "contact:write"]);
    assert_eq!(gate.last_error(), None);
    assert!(!gate.is_loading());
}

#[tokio::test]
async fn test_failed_check_denies_and_is_not_cached() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/api/permissions/check")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("upstream exploded")
        .expect(2)
        .create_async()
        .await;
    let gate = gate(&server);

    let first = gate.check_permission("user", "read").await;
    assert!(!first.allowed);
    let reason = first.reason.expect("denial carries a reason");
    assert!(!reason.is_empty());
    assert!(reason.contains("500"));
    assert_eq!(gate.cache_stats().entries, 0);

    // Nothing was cached, so the next call goes back to the server.
    let second = gate.check_permission("user", "read").await;
    assert!(!second.allowed);
    assert!(!second.cached);

    m.assert_async().await;
}

#[tokio::test]
async fn test_forbidden_check_denies() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/api/permissions/check")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let gate = gate(&server);

    let result = gate.check_permission("rbac", "manage").await;
    assert!(!result.allowed);
    assert!(result.reason.is_some());
}

#[tokio::test]
async fn test_missing_token_denies_without_request() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("GET", "/api/permissions/check")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let no_token = || None::<String>;
    let gate = PermissionGate::new(&GateConfig::new(&server.url()), Arc::new(no_token)).unwrap();

    let result = gate.check_permission("user", "read").await;
    assert!(!result.allowed);
    assert!(result.reason.unwrap().contains("Not authenticated"));

    m.assert_async().await;
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_permissions() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", "/api/auth/me")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;
    let gate = gate(&server);
    gate.set_permissions(["user:read"]);

    let err = gate.reload().await.unwrap_err();

    assert!(err.to_string().contains("Failed to reload permissions"));
    assert!(gate.has_permission("user:read"));
    let error = gate.last_error().expect("error is observable");
    assert_eq!(error, "Server error (HTTP 503): maintenance");
    assert!(!gate.is_loading());
}

#[tokio::test]
async fn test_successful_reload_clears_last_error() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/api/auth/me")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let gate = gate(&server);

    assert!(gate.reload().await.is_err());
    assert!(gate.last_error().is_some());
    failing.remove_async().await;

    let _ok = mock_me(&mut server, &[SUPERUSER]).await;
    gate.reload().await.unwrap();

    assert_eq!(gate.last_error(), None);
    assert_eq!(
        gate.decide(&Requirement::single("media", "delete")),
        GateDecision::Allow
    );
}

#[tokio::test]
async fn test_watch_identity_applies_changes() {
    let server = Server::new_async().await;
    let gate = Arc::new(gate(&server));
    let (tx, rx) = watch::channel(vec!["user:read".to_string()]);

    let handle = gate.watch_identity(rx);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(gate.has_permission("user:read"));

    tx.send(vec!["partner:read".to_string()]).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!gate.has_permission("user:read"));
    assert!(gate.has_permission("partner:read"));

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_logout_during_reload_keeps_identity_cleared() {
    let body = serde_json::json!({
        "success": true,
        "data": { "permissions": [SUPERUSER] }
    });
    let url = delayed_server(body.to_string(), Duration::from_millis(300)).await;
    let gate = Arc::new(gate_with(GateConfig::new(&url)));
    gate.set_permissions(["user:read"]);

    let reloading = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.reload().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gate.is_loading());

    gate.clear_identity();
    let result = reloading.await.unwrap();

    assert!(matches!(result, Err(GateError::ReloadSuperseded)));
    assert!(gate.permissions().is_empty());
    assert!(!gate.has_permission("media:delete"));
    assert_eq!(gate.last_error(), None);
    assert!(!gate.is_loading());
}

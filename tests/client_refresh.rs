//! SessionClient behavior against a scripted stub server: refresh
//! coalescing, retry-once, backoff, and forced logout.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{json, Value};

use sessiond::client::{AuthPhase, ClientError, RetryPolicy, SessionClient};

#[derive(Default)]
struct StubState {
    refresh_calls: AtomicU64,
    protected_calls: AtomicU64,
    /// Access token the protected endpoint currently accepts.
    accepted: Mutex<Option<String>>,
    /// Status codes the refresh endpoint plays back before succeeding.
    scripted_refresh: Mutex<Vec<u16>>,
    /// When set, the protected endpoint 401s no matter what.
    reject_api: AtomicBool,
    /// Widens the coalescing window.
    refresh_delay_ms: AtomicU64,
}

type Stub = Arc<StubState>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

async fn stub_login(State(stub): State<Stub>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    *stub.accepted.lock().unwrap() = Some("access-0".into());
    let jar = jar.add(Cookie::build(("refresh_token", "refresh-0")).path("/auth"));
    (
        jar,
        Json(json!({ "access_token": "access-0", "token_type": "Bearer", "expires_in": 900 })),
    )
}

async fn stub_refresh(
    State(stub): State<Stub>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), StatusCode> {
    let n = stub.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    let delay = stub.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let scripted = stub.scripted_refresh.lock().unwrap().pop();
    if let Some(code) = scripted {
        return Err(StatusCode::from_u16(code).unwrap());
    }

    if jar.get("refresh_token").is_none() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let access = format!("access-{n}");
    *stub.accepted.lock().unwrap() = Some(access.clone());
    let jar = jar.add(Cookie::build(("refresh_token", format!("refresh-{n}"))).path("/auth"));
    Ok((
        jar,
        Json(json!({ "access_token": access, "token_type": "Bearer", "expires_in": 900 })),
    ))
}

async fn stub_logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(("refresh_token", "")).path("/auth"));
    (jar, Json(json!({ "status": "ok" })))
}

async fn stub_data(
    State(stub): State<Stub>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    stub.protected_calls.fetch_add(1, Ordering::SeqCst);

    if stub.reject_api.load(Ordering::SeqCst) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let accepted = stub.accepted.lock().unwrap().clone();
    match (bearer(&headers), accepted) {
        (Some(token), Some(accepted)) if token == accepted => Ok(Json(json!({ "ok": true }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/auth/login", post(stub_login))
        .route("/auth/refresh", post(stub_refresh))
        .route("/auth/logout", post(stub_logout))
        .route("/api/data", get(stub_data))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

#[tokio::test]
async fn concurrent_expiries_coalesce_into_one_refresh() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::new(base.as_str()).unwrap();
    client.login("u@example.com", "password").await.unwrap();

    // Invalidate the issued access token server-side so every in-flight call
    // sees the expiry signal at once.
    *stub.accepted.lock().unwrap() = Some("rotated-away".into());
    stub.refresh_delay_ms.store(50, Ordering::SeqCst);

    let calls = (0..8).map(|_| {
        let client = client.clone();
        async move { client.get_json::<Value>("/api/data").await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert!(result.unwrap().get("ok").is_some());
    }
    assert_eq!(
        stub.refresh_calls.load(Ordering::SeqCst),
        1,
        "eight concurrent expiries must collapse into one refresh"
    );
}

#[tokio::test]
async fn failed_call_retries_once_and_only_once() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::new(base.as_str()).unwrap();
    client.login("u@example.com", "password").await.unwrap();

    // The refresh succeeds, but the API keeps rejecting: the call must
    // surface the second 401 instead of refreshing again.
    stub.reject_api.store(true, Ordering::SeqCst);

    let result = client.get_json::<Value>("/api/data").await;
    assert!(matches!(result, Err(ClientError::Unauthorized)));
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stub.protected_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn explicit_refresh_backs_off_through_transient_failures() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::with_policy(base.as_str(), fast_policy()).unwrap();
    client.login("u@example.com", "password").await.unwrap();

    // Two 503s, then the unscripted success path.
    *stub.scripted_refresh.lock().unwrap() = vec![503, 503];

    client.refresh_session().await.unwrap();
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 3);
    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn explicit_refresh_gives_up_after_the_attempt_ceiling() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::with_policy(base.as_str(), fast_policy()).unwrap();
    client.login("u@example.com", "password").await.unwrap();

    *stub.scripted_refresh.lock().unwrap() = vec![503, 503, 503, 503];

    let result = client.refresh_session().await;
    assert!(matches!(result, Err(ClientError::ServerError(_))));
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 3);
    // Transient exhaustion is not a terminal failure; the session survives
    // for a later attempt.
    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn terminal_refresh_failure_forces_logout() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::with_policy(base.as_str(), fast_policy()).unwrap();
    let mut phases = client.subscribe();
    client.login("u@example.com", "password").await.unwrap();
    assert_eq!(*phases.borrow_and_update(), AuthPhase::Authenticated);

    // The server rejects the rotation outright - revoked credential.
    *stub.scripted_refresh.lock().unwrap() = vec![401];

    let result = client.refresh_session().await;
    assert!(matches!(result, Err(ClientError::Unauthorized)));
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);

    assert!(!client.is_authenticated().await);
    phases.changed().await.unwrap();
    assert_eq!(*phases.borrow_and_update(), AuthPhase::LoggedOut);
}

#[tokio::test]
async fn coalesced_refresh_failure_forces_logout_too() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::new(base.as_str()).unwrap();
    client.login("u@example.com", "password").await.unwrap();

    // Expire the access token and make the rotation terminally fail.
    *stub.accepted.lock().unwrap() = Some("rotated-away".into());
    *stub.scripted_refresh.lock().unwrap() = vec![401];

    let result = client.get_json::<Value>("/api/data").await;
    assert!(matches!(result, Err(ClientError::Unauthorized)));
    assert!(!client.is_authenticated().await);
    assert_eq!(*client.subscribe().borrow(), AuthPhase::LoggedOut);
}

#[tokio::test]
async fn logout_clears_local_state_even_without_a_server_session() {
    let stub = Stub::default();
    let base = spawn_stub(stub.clone()).await;

    let client = SessionClient::new(base.as_str()).unwrap();
    client.login("u@example.com", "password").await.unwrap();
    assert!(client.is_authenticated().await);

    client.logout().await;
    assert!(!client.is_authenticated().await);
    assert_eq!(*client.subscribe().borrow(), AuthPhase::LoggedOut);

    // Logging out again is harmless.
    client.logout().await;
    assert!(!client.is_authenticated().await);
}

//! Consumer-side session manager.
//!
//! Holds the access token in memory only, attaches it to outbound calls, and
//! when a call comes back 401 performs one coalesced rotation: the first
//! caller through the gate refreshes, everyone who queued behind it reuses
//! the outcome. Each failed call retries at most once after a refresh.
//! Explicit renewal (`refresh_session`) retries transient failures with
//! exponential backoff; any terminal refresh failure clears the session and
//! is announced on the `AuthPhase` watch channel.

pub mod error;

pub use error::ClientError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// HTTP request timeout for ordinary calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Rotation must never hang application startup; cap it hard.
const REFRESH_TIMEOUT_SECS: u64 = 5;

/// What the application observes about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticated,
    /// Terminal refresh failure or explicit logout; re-login required.
    LoggedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt - 1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
}

/// Clone is cheap - everything lives behind one Arc, and the underlying
/// reqwest client pools connections.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    /// Stable per-process identifier, reported at login so the session shows
    /// up recognizably in session listings.
    device_id: String,
    policy: RetryPolicy,
    access: RwLock<Option<String>>,
    /// Singleflight gate: at most one rotation in flight per process.
    refresh_gate: Mutex<()>,
    /// Bumped on every successful token change; a caller that queued on the
    /// gate compares generations to learn whether someone already refreshed
    /// on its behalf.
    generation: AtomicU64,
    phase: watch::Sender<AuthPhase>,
}

impl SessionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_policy(base_url, RetryPolicy::default())
    }

    pub fn with_policy(
        base_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            // The refresh token travels in a scoped http-only cookie; the jar
            // round-trips it without the application ever seeing it.
            .cookie_store(true)
            .build()?;

        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        let (phase, _) = watch::channel(AuthPhase::Unauthenticated);
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                device_id: Uuid::new_v4().to_string(),
                policy,
                access: RwLock::new(None),
                refresh_gate: Mutex::new(()),
                generation: AtomicU64::new(0),
                phase,
            }),
        })
    }

    /// Watch for forced logout (and the other phase changes).
    pub fn subscribe(&self) -> watch::Receiver<AuthPhase> {
        self.inner.phase.subscribe()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.access.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.access.read().await.is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let url = format!("{}/auth/login", self.inner.base_url);
        let resp = self
            .inner
            .http
            .post(url)
            .header("x-device-id", &self.inner.device_id)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let resp = check(resp).await?;
        let payload: TokenPayload = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        self.install_token(payload.access_token).await;
        Ok(())
    }

    /// Best-effort: the server side of logout never fails meaningfully, and
    /// local state is cleared regardless.
    pub async fn logout(&self) {
        let url = format!("{}/auth/logout", self.inner.base_url);
        if let Err(e) = self.inner.http.post(url).send().await {
            debug!(error = %e, "logout request failed");
        }
        self.clear_session().await;
    }

    /// Explicit renewal, for proactive use before a known expiry. Transient
    /// failures are retried with exponential backoff up to the policy
    /// ceiling; a terminal failure forces logout immediately.
    pub async fn refresh_session(&self) -> Result<(), ClientError> {
        let _flight = self.inner.refresh_gate.lock().await;

        let mut attempt = 1;
        loop {
            match self.rotate_once().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.inner.policy.max_attempts {
                        return Err(e);
                    }
                    let delay = self.inner.policy.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "refresh backoff");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "refresh failed terminally; forcing logout");
                    self.clear_session().await;
                    return Err(e);
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request_json(Method::GET, path, None::<&()>).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.request_json(Method::POST, path, Some(body)).await
    }

    /// One call, at most one refresh, at most one retry. A 401 on the
    /// retried call is surfaced as-is - a second refresh here would loop
    /// forever against a server that keeps rejecting us.
    async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let observed = self.inner.generation.load(Ordering::Acquire);

        let resp = self.send(method.clone(), path, body).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return parse_json(resp).await;
        }

        self.coalesced_refresh(observed).await?;

        let retry = self.send(method, path, body).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        parse_json(retry).await
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let mut req = self.inner.http.request(method, url);
        if let Some(token) = self.access_token().await {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }

    /// The client-side half of the rotation race defense: any number of
    /// concurrent expiry signals collapse to one network call. Callers that
    /// queued behind the winner see the generation advance and skip.
    async fn coalesced_refresh(&self, observed_generation: u64) -> Result<(), ClientError> {
        let _flight = self.inner.refresh_gate.lock().await;
        if self.inner.generation.load(Ordering::Acquire) != observed_generation {
            return Ok(());
        }

        match self.rotate_once().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                warn!(error = %e, "refresh rejected; forcing logout");
                self.clear_session().await;
                Err(e)
            }
        }
    }

    /// Exactly one `POST /auth/refresh`, hard 5s cap. The refresh cookie is
    /// attached by the jar; the rotated cookie in the response replaces it.
    async fn rotate_once(&self) -> Result<(), ClientError> {
        let url = format!("{}/auth/refresh", self.inner.base_url);
        let resp = self
            .inner
            .http
            .post(url)
            .timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
            .send()
            .await?;
        let resp = check(resp).await?;
        let payload: TokenPayload = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        self.install_token(payload.access_token).await;
        debug!("access token rotated");
        Ok(())
    }

    async fn install_token(&self, token: String) {
        *self.inner.access.write().await = Some(token);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.phase.send_replace(AuthPhase::Authenticated);
    }

    async fn clear_session(&self) {
        *self.inner.access.write().await = None;
        // Invalidate queued coalescers so they fail fast instead of piling
        // further refresh attempts onto a dead session.
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.phase.send_replace(AuthPhase::LoggedOut);
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::from_status(status, &body))
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let resp = check(resp).await?;
    resp.json()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};

use crate::{
    auth::guard::CurrentUser,
    dto::auth::{LoginRequest, LoginResponse, RefreshResponse},
    errors::AppError,
    models::refresh_record::DeviceInfo,
    models::user::UserPublic,
    state::AppState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Scoped so the browser only presents the refresh token to the rotation and
/// end-session endpoints, never to ordinary API calls.
const REFRESH_COOKIE_PATH: &str = "/auth";

fn refresh_cookie(
    state: &AppState,
    token: String,
    expires_at: DateTime<Utc>,
) -> Cookie<'static> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    Cookie::build((REFRESH_COOKIE, token))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(state.cfg.cookie_secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

fn expired_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, ""))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .build()
}

fn device_from_headers(headers: &HeaderMap) -> Option<DeviceInfo> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    let info = DeviceInfo {
        ip: header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or_default().trim().to_string()),
        user_agent: header("user-agent"),
        device_id: header("x-device-id"),
    };
    if info.ip.is_none() && info.user_agent.is_none() && info.device_id.is_none() {
        None
    } else {
        Some(info)
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("email/password required".into()));
    }

    let user = state
        .directory
        .verify_credentials(&email, &req.password)
        .await?;

    let device = device_from_headers(&headers);
    let tokens = state.sessions.login(&user, device).await?;

    let jar = jar.add(refresh_cookie(
        &state,
        tokens.refresh_token,
        tokens.refresh_expires_at,
    ));

    Ok((
        jar,
        Json(LoginResponse {
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            expires_in: tokens.access_expires_in,
            user: UserPublic::from(user),
        }),
    ))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let tokens = state.sessions.refresh(&token).await?;

    let jar = jar.add(refresh_cookie(
        &state,
        tokens.refresh_token,
        tokens.refresh_expires_at,
    ));

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            expires_in: tokens.access_expires_in,
        }),
    ))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        state.sessions.logout(cookie.value()).await?;
    }
    let jar = jar.remove(expired_refresh_cookie());

    Ok((jar, Json(serde_json::json!({ "status": "ok" }))))
}

pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let revoked = state.sessions.logout_all(user.id).await?;
    Ok(Json(
        serde_json::json!({ "status": "ok", "revoked": revoked }),
    ))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The authenticated identity", body = UserPublic)
    ),
    tag = "auth"
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(user.into())
}

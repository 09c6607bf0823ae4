use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    auth::jwt::TokenKind,
    directory::Directory,
    errors::{AppError, AuthFailure},
    models::user::UserDoc,
    state::AppState,
};

pub const ROLE_ADMIN: &str = "admin";

/// The authenticated identity behind a bearer access token.
///
/// Verifies the token, then loads the identity fresh from the directory so a
/// suspended account is rejected even while its token is cryptographically
/// valid. Read-only: never touches refresh records.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserDoc);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let claims = state
            .signer
            .verify(bearer.token(), TokenKind::Access)
            .map_err(AppError::unauthenticated)?;

        let user_id = mongodb::bson::oid::ObjectId::parse_str(&claims.sub)
            .map_err(|_| AppError::unauthenticated(AuthFailure::InvalidSignature))?;

        let user = state
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !user.active {
            return Err(AppError::unauthenticated(AuthFailure::UserInactive));
        }

        Ok(Self(user))
    }
}

/// Pure role predicate. An empty `allowed` slice means any authenticated
/// identity passes.
pub fn require_role(user: &UserDoc, allowed: &[&str]) -> bool {
    allowed.is_empty() || user.roles.iter().any(|r| allowed.contains(&r.as_str()))
}

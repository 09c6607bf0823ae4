use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::user::UserPublic;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub expires_at: String,
}

impl From<crate::models::refresh_record::RefreshRecordDoc> for SessionView {
    fn from(r: crate::models::refresh_record::RefreshRecordDoc) -> Self {
        let device = r.device.unwrap_or_default();
        Self {
            id: r.id.to_hex(),
            ip: device.ip,
            user_agent: device.user_agent,
            device_id: device.device_id,
            created_at: r.created_at.to_rfc3339(),
            last_used_at: r.last_used_at.map(|t| t.to_rfc3339()),
            expires_at: r.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Admin-only: list another owner's sessions by hex id.
    pub owner: Option<String>,
}

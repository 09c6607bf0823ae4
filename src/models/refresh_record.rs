use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Where a session was opened from. Shown in the session-listing UI and kept
/// for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

/// Durable state behind one refresh token.
///
/// `_id` is the public record id, also embedded in the token as `jti`; the
/// raw token is never stored, only `token_hash`. `replaced_by` links a
/// rotation chain. `revoked_at` is set at most once and never cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRecordDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub owner_id: ObjectId,

    /// sha256 hex of the full signed refresh token.
    pub token_hash: String,

    pub device: Option<DeviceInfo>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,

    pub replaced_by: Option<ObjectId>,
}

impl RefreshRecordDoc {
    pub fn new(
        id: ObjectId,
        owner_id: ObjectId,
        token_hash: String,
        device: Option<DeviceInfo>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            token_hash,
            device,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at,
            revoked_at: None,
            revoked_reason: None,
            replaced_by: None,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

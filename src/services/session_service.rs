use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use tracing::{info, warn};

use crate::{
    auth::guard::{require_role, ROLE_ADMIN},
    auth::jwt::{sha256_hex, TokenKind, TokenSigner},
    directory::Directory,
    errors::{AppError, AuthFailure},
    models::{
        refresh_record::{DeviceInfo, RefreshRecordDoc},
        user::UserDoc,
    },
    store::{
        RefreshStore, RotateOutcome, REASON_LOGOUT, REASON_LOGOUT_ALL, REASON_REUSE_DETECTED,
        REASON_USER_REVOKED,
    },
};

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
    pub record_id: ObjectId,
}

/// Orchestrates login, rotation, and revocation against the signer and the
/// record store. The state machine per record is ACTIVE → ROTATED or
/// ACTIVE → REVOKED, nothing else; the store's `rotate` CAS enforces it
/// under concurrency.
#[derive(Clone)]
pub struct SessionService {
    signer: Arc<TokenSigner>,
    store: Arc<dyn RefreshStore>,
    directory: Arc<dyn Directory>,
    reuse_revokes_all: bool,
}

impl SessionService {
    pub fn new(
        signer: Arc<TokenSigner>,
        store: Arc<dyn RefreshStore>,
        directory: Arc<dyn Directory>,
        reuse_revokes_all: bool,
    ) -> Self {
        Self {
            signer,
            store,
            directory,
            reuse_revokes_all,
        }
    }

    pub fn store(&self) -> &Arc<dyn RefreshStore> {
        &self.store
    }

    pub async fn login(
        &self,
        user: &UserDoc,
        device: Option<DeviceInfo>,
    ) -> Result<IssuedTokens, AppError> {
        let tokens = self.issue_for(user, device).await?;
        info!(
            target: "audit",
            owner = %user.id.to_hex(),
            record = %tokens.record_id.to_hex(),
            "session opened"
        );
        Ok(tokens)
    }

    /// Single-use rotation with reuse detection.
    ///
    /// A validly-signed refresh token whose record is no longer active means
    /// the token was already spent: someone is replaying it. Losing the
    /// rotate CAS means the same thing, just discovered later. Both paths
    /// apply the reuse policy and report an indistinct `Unauthorized`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AppError> {
        let claims = self
            .signer
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(AppError::unauthenticated)?;

        let owner_id = parse_hex_id(&claims.sub)?;
        let record_id = parse_hex_id(claims.jti.as_deref().unwrap_or_default())?;

        let Some(current) = self.store.find_active(record_id).await? else {
            self.handle_reuse(owner_id, record_id).await?;
            return Err(AppError::unauthenticated(AuthFailure::RevokedOrReused));
        };

        // The jti binds the token to a record; the stored hash binds the
        // record back to exactly one token.
        if current.token_hash != sha256_hex(refresh_token) {
            return Err(AppError::unauthenticated(AuthFailure::InvalidSignature));
        }

        let user = self
            .directory
            .find_by_id(current.owner_id)
            .await?
            .ok_or_else(|| AppError::unauthenticated(AuthFailure::RevokedOrReused))?;
        if !user.active {
            return Err(AppError::unauthenticated(AuthFailure::UserInactive));
        }

        let successor_id = ObjectId::new();
        let new_refresh = self
            .signer
            .issue_refresh(user.id.to_hex(), successor_id.to_hex())?;
        let successor = RefreshRecordDoc::new(
            successor_id,
            user.id,
            sha256_hex(&new_refresh),
            current.device.clone(),
            Utc::now() + self.signer.refresh_ttl(),
        );

        match self.store.rotate(record_id, successor).await? {
            RotateOutcome::Rotated(rec) => {
                let access_token = self.signer.issue_access(&user)?;
                info!(
                    target: "audit",
                    owner = %user.id.to_hex(),
                    old_record = %record_id.to_hex(),
                    new_record = %rec.id.to_hex(),
                    "session rotated"
                );
                Ok(IssuedTokens {
                    access_token,
                    refresh_token: new_refresh,
                    token_type: "Bearer".into(),
                    access_expires_in: self.signer.access_ttl().num_seconds(),
                    refresh_expires_at: rec.expires_at,
                    record_id: rec.id,
                })
            }
            RotateOutcome::AlreadyRotated | RotateOutcome::NotFound => {
                self.handle_reuse(owner_id, record_id).await?;
                Err(AppError::unauthenticated(AuthFailure::RevokedOrReused))
            }
        }
    }

    /// Best-effort: an invalid or already-revoked token is not an error from
    /// the caller's perspective; their session ends either way.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        if let Ok(claims) = self.signer.verify(refresh_token, TokenKind::Refresh) {
            if let Some(record_id) = claims.jti.as_deref().and_then(|s| ObjectId::parse_str(s).ok())
            {
                if let Err(e) = self.store.revoke(record_id, REASON_LOGOUT).await {
                    warn!(record = %record_id.to_hex(), error = %e, "logout revoke failed");
                } else {
                    info!(target: "audit", record = %record_id.to_hex(), "session closed");
                }
            }
        }
        Ok(())
    }

    pub async fn logout_all(&self, owner_id: ObjectId) -> Result<u64, AppError> {
        let revoked = self
            .store
            .revoke_all_for_owner(owner_id, REASON_LOGOUT_ALL)
            .await?;
        info!(target: "audit", owner = %owner_id.to_hex(), revoked, "all sessions closed");
        Ok(revoked)
    }

    /// A caller may list their own sessions; the admin role may list anyone's.
    pub async fn list_sessions(
        &self,
        caller: &UserDoc,
        owner_id: ObjectId,
    ) -> Result<Vec<RefreshRecordDoc>, AppError> {
        if caller.id != owner_id && !require_role(caller, &[ROLE_ADMIN]) {
            return Err(AppError::Forbidden);
        }
        self.store.list_active_for_owner(owner_id).await
    }

    /// Revoke one session by record id. Idempotent: revoking a record that is
    /// already gone or inactive succeeds silently.
    pub async fn revoke_session(
        &self,
        caller: &UserDoc,
        record_id: ObjectId,
    ) -> Result<(), AppError> {
        let Some(record) = self.store.find_active(record_id).await? else {
            return Ok(());
        };
        if record.owner_id != caller.id && !require_role(caller, &[ROLE_ADMIN]) {
            return Err(AppError::Forbidden);
        }
        self.store.revoke(record_id, REASON_USER_REVOKED).await?;
        info!(
            target: "audit",
            owner = %record.owner_id.to_hex(),
            record = %record_id.to_hex(),
            "session revoked"
        );
        Ok(())
    }

    async fn issue_for(
        &self,
        user: &UserDoc,
        device: Option<DeviceInfo>,
    ) -> Result<IssuedTokens, AppError> {
        let record_id = ObjectId::new();
        let refresh_token = self
            .signer
            .issue_refresh(user.id.to_hex(), record_id.to_hex())?;
        let expires_at = Utc::now() + self.signer.refresh_ttl();

        let record = RefreshRecordDoc::new(
            record_id,
            user.id,
            sha256_hex(&refresh_token),
            device,
            expires_at,
        );
        self.store.create(record).await?;

        let access_token = self.signer.issue_access(user)?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".into(),
            access_expires_in: self.signer.access_ttl().num_seconds(),
            refresh_expires_at: expires_at,
            record_id,
        })
    }

    /// Reuse implies possible credential theft; the server cannot tell a
    /// stolen replay from a legitimate multi-device race, so the default is
    /// to revoke every active session of the owner and force re-login.
    async fn handle_reuse(&self, owner_id: ObjectId, record_id: ObjectId) -> Result<(), AppError> {
        if self.reuse_revokes_all {
            let revoked = self
                .store
                .revoke_all_for_owner(owner_id, REASON_REUSE_DETECTED)
                .await?;
            warn!(
                target: "audit",
                owner = %owner_id.to_hex(),
                record = %record_id.to_hex(),
                revoked,
                "refresh token reuse detected; all sessions revoked"
            );
        } else {
            self.store.revoke(record_id, REASON_REUSE_DETECTED).await?;
            warn!(
                target: "audit",
                owner = %owner_id.to_hex(),
                record = %record_id.to_hex(),
                "refresh token reuse detected; record revoked"
            );
        }
        Ok(())
    }
}

fn parse_hex_id(hex: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(hex)
        .map_err(|_| AppError::unauthenticated(AuthFailure::InvalidSignature))
}

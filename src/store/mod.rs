//! Refresh record persistence.
//!
//! `rotate` is the one hard synchronization point of the whole service: it
//! must be a storage-layer compare-and-swap keyed on the predecessor still
//! being active, so that exactly one of any number of concurrent rotation
//! attempts wins, across all server processes.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::{errors::AppError, models::refresh_record::RefreshRecordDoc};

pub use memory::MemoryRefreshStore;
pub use mongo::MongoRefreshStore;

pub const REASON_ROTATED: &str = "rotated";
pub const REASON_LOGOUT: &str = "logout";
pub const REASON_LOGOUT_ALL: &str = "logout_all";
pub const REASON_REUSE_DETECTED: &str = "reuse_detected";
pub const REASON_USER_REVOKED: &str = "user_revoked";

/// Result of the rotation compare-and-swap.
#[derive(Debug)]
pub enum RotateOutcome {
    /// This caller won: the predecessor is revoked with `replaced_by` set and
    /// the successor is inserted, with no window where both were active.
    Rotated(RefreshRecordDoc),
    /// The predecessor exists but was no longer active; a concurrent caller
    /// already rotated it, or it was revoked. Callers treat this as a reuse
    /// signal.
    AlreadyRotated,
    NotFound,
}

#[async_trait]
pub trait RefreshStore: Send + Sync {
    async fn create(&self, record: RefreshRecordDoc) -> Result<(), AppError>;

    /// Returns the record only while it is active (`revoked_at == None` and
    /// unexpired). Revoked, expired, and missing records are all `None`;
    /// callers must not be able to tell them apart.
    async fn find_active(&self, record_id: ObjectId) -> Result<Option<RefreshRecordDoc>, AppError>;

    /// Atomically revoke `old_id` (setting `replaced_by`) and insert
    /// `successor`. Exactly one concurrent caller per `old_id` observes
    /// `Rotated`.
    async fn rotate(
        &self,
        old_id: ObjectId,
        successor: RefreshRecordDoc,
    ) -> Result<RotateOutcome, AppError>;

    /// Idempotent: a no-op on records that are already revoked.
    async fn revoke(&self, record_id: ObjectId, reason: &str) -> Result<(), AppError>;

    async fn revoke_all_for_owner(&self, owner_id: ObjectId, reason: &str)
        -> Result<u64, AppError>;

    async fn list_active_for_owner(
        &self,
        owner_id: ObjectId,
    ) -> Result<Vec<RefreshRecordDoc>, AppError>;

    /// Delete records that are both revoked and expired before `before`.
    /// Only ever touches terminal-state records, so it is safe to run
    /// alongside everything else.
    async fn purge_expired_revoked(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson},
    Collection,
};

use crate::{
    errors::AppError,
    models::refresh_record::RefreshRecordDoc,
    store::{RefreshStore, RotateOutcome, REASON_ROTATED},
};

/// MongoDB-backed store. Rotation relies on a single-document conditional
/// `find_one_and_update`, which MongoDB applies atomically: the filter
/// requires the predecessor to still be active, so concurrent rotations of
/// the same record resolve to exactly one winner.
pub struct MongoRefreshStore {
    records: Collection<RefreshRecordDoc>,
    op_timeout: Duration,
}

impl MongoRefreshStore {
    pub fn new(records: Collection<RefreshRecordDoc>, op_timeout: Duration) -> Self {
        Self {
            records,
            op_timeout,
        }
    }

    /// Every store call is bounded. A timed-out write is reported as a
    /// failure; in particular a timed-out rotate must never be assumed to
    /// have succeeded.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: std::future::IntoFuture<Output = Result<T, mongodb::error::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(AppError::from),
            Err(_) => Err(AppError::StoreUnavailable),
        }
    }

    fn active_filter(record_id: ObjectId, now: DateTime<Utc>) -> mongodb::bson::Document {
        doc! {
            "_id": record_id,
            "revoked_at": Bson::Null,
            "expires_at": { "$gt": bson::DateTime::from_chrono(now) },
        }
    }
}

#[async_trait]
impl RefreshStore for MongoRefreshStore {
    async fn create(&self, record: RefreshRecordDoc) -> Result<(), AppError> {
        self.bounded(async {
            self.records.insert_one(&record).await?;
            Ok(())
        })
        .await
    }

    async fn find_active(&self, record_id: ObjectId) -> Result<Option<RefreshRecordDoc>, AppError> {
        let filter = Self::active_filter(record_id, Utc::now());
        self.bounded(self.records.find_one(filter)).await
    }

    async fn rotate(
        &self,
        old_id: ObjectId,
        successor: RefreshRecordDoc,
    ) -> Result<RotateOutcome, AppError> {
        let now = Utc::now();
        let filter = Self::active_filter(old_id, now);
        let update = doc! { "$set": {
            "revoked_at": bson::DateTime::from_chrono(now),
            "revoked_reason": REASON_ROTATED,
            "replaced_by": successor.id,
            "last_used_at": bson::DateTime::from_chrono(now),
        }};

        let previous = self
            .bounded(self.records.find_one_and_update(filter, update))
            .await?;

        if previous.is_none() {
            // Lost the race, or the record was revoked/expired/never existed.
            // One follow-up read tells the caller which; the distinction is
            // what turns a replay into a reuse signal.
            let exists = self
                .bounded(self.records.find_one(doc! { "_id": old_id }))
                .await?;
            return Ok(match exists {
                Some(_) => RotateOutcome::AlreadyRotated,
                None => RotateOutcome::NotFound,
            });
        }

        // The predecessor is revoked at this point; inserting the successor
        // second means a crash between the two steps kills the chain rather
        // than ever leaving two active records.
        self.bounded(async {
            self.records.insert_one(&successor).await?;
            Ok(())
        })
        .await?;

        Ok(RotateOutcome::Rotated(successor))
    }

    async fn revoke(&self, record_id: ObjectId, reason: &str) -> Result<(), AppError> {
        let update = doc! { "$set": {
            "revoked_at": bson::DateTime::from_chrono(Utc::now()),
            "revoked_reason": reason,
        }};
        // Filter on still-active so revocation stays monotonic: an already
        // revoked record keeps its original timestamp and reason.
        self.bounded(async {
            self.records
                .update_one(doc! { "_id": record_id, "revoked_at": Bson::Null }, update)
                .await?;
            Ok(())
        })
        .await
    }

    async fn revoke_all_for_owner(
        &self,
        owner_id: ObjectId,
        reason: &str,
    ) -> Result<u64, AppError> {
        let update = doc! { "$set": {
            "revoked_at": bson::DateTime::from_chrono(Utc::now()),
            "revoked_reason": reason,
        }};
        let res = self
            .bounded(
                self.records
                    .update_many(doc! { "owner_id": owner_id, "revoked_at": Bson::Null }, update),
            )
            .await?;
        Ok(res.modified_count)
    }

    async fn list_active_for_owner(
        &self,
        owner_id: ObjectId,
    ) -> Result<Vec<RefreshRecordDoc>, AppError> {
        let filter = doc! {
            "owner_id": owner_id,
            "revoked_at": Bson::Null,
            "expires_at": { "$gt": bson::DateTime::from_chrono(Utc::now()) },
        };
        self.bounded(async {
            let cursor = self.records.find(filter).await?;
            cursor.try_collect().await
        })
        .await
    }

    async fn purge_expired_revoked(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let filter = doc! {
            "revoked_at": { "$ne": Bson::Null },
            "expires_at": { "$lt": bson::DateTime::from_chrono(before) },
        };
        let res = self.bounded(self.records.delete_many(filter)).await?;
        Ok(res.deleted_count)
    }
}

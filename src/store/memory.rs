use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::{
    errors::AppError,
    models::refresh_record::RefreshRecordDoc,
    store::{RefreshStore, RotateOutcome, REASON_ROTATED},
};

/// Single-process store for tests and local development. The map mutex gives
/// the same exactly-one-winner rotation semantics the Mongo conditional
/// update provides, but only within one process.
#[derive(Default)]
pub struct MemoryRefreshStore {
    records: Mutex<HashMap<ObjectId, RefreshRecordDoc>>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn create(&self, record: RefreshRecordDoc) -> Result<(), AppError> {
        self.records
            .lock()
            .expect("record map poisoned")
            .insert(record.id, record);
        Ok(())
    }

    async fn find_active(&self, record_id: ObjectId) -> Result<Option<RefreshRecordDoc>, AppError> {
        let now = Utc::now();
        Ok(self
            .records
            .lock()
            .expect("record map poisoned")
            .get(&record_id)
            .filter(|r| r.is_active(now))
            .cloned())
    }

    async fn rotate(
        &self,
        old_id: ObjectId,
        successor: RefreshRecordDoc,
    ) -> Result<RotateOutcome, AppError> {
        let now = Utc::now();
        let mut records = self.records.lock().expect("record map poisoned");

        let Some(old) = records.get_mut(&old_id) else {
            return Ok(RotateOutcome::NotFound);
        };
        if !old.is_active(now) {
            return Ok(RotateOutcome::AlreadyRotated);
        }

        old.revoked_at = Some(now);
        old.revoked_reason = Some(REASON_ROTATED.into());
        old.replaced_by = Some(successor.id);
        old.last_used_at = Some(now);
        records.insert(successor.id, successor.clone());

        Ok(RotateOutcome::Rotated(successor))
    }

    async fn revoke(&self, record_id: ObjectId, reason: &str) -> Result<(), AppError> {
        let mut records = self.records.lock().expect("record map poisoned");
        if let Some(rec) = records.get_mut(&record_id) {
            if rec.revoked_at.is_none() {
                rec.revoked_at = Some(Utc::now());
                rec.revoked_reason = Some(reason.into());
            }
        }
        Ok(())
    }

    async fn revoke_all_for_owner(
        &self,
        owner_id: ObjectId,
        reason: &str,
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut count = 0;
        let mut records = self.records.lock().expect("record map poisoned");
        for rec in records.values_mut() {
            if rec.owner_id == owner_id && rec.revoked_at.is_none() {
                rec.revoked_at = Some(now);
                rec.revoked_reason = Some(reason.into());
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active_for_owner(
        &self,
        owner_id: ObjectId,
    ) -> Result<Vec<RefreshRecordDoc>, AppError> {
        let now = Utc::now();
        Ok(self
            .records
            .lock()
            .expect("record map poisoned")
            .values()
            .filter(|r| r.owner_id == owner_id && r.is_active(now))
            .cloned()
            .collect())
    }

    async fn purge_expired_revoked(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = self.records.lock().expect("record map poisoned");
        let before_len = records.len();
        records.retain(|_, r| !(r.revoked_at.is_some() && r.expires_at < before));
        Ok((before_len - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(owner: ObjectId, ttl: Duration) -> RefreshRecordDoc {
        RefreshRecordDoc::new(ObjectId::new(), owner, "hash".into(), None, Utc::now() + ttl)
    }

    #[tokio::test]
    async fn find_active_hides_revoked_and_expired() {
        let store = MemoryRefreshStore::new();
        let owner = ObjectId::new();

        let live = record(owner, Duration::days(1));
        let dead = record(owner, Duration::days(-1));
        let live_id = live.id;
        let dead_id = dead.id;
        store.create(live).await.unwrap();
        store.create(dead).await.unwrap();

        assert!(store.find_active(live_id).await.unwrap().is_some());
        assert!(store.find_active(dead_id).await.unwrap().is_none());

        store.revoke(live_id, "logout").await.unwrap();
        assert!(store.find_active(live_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_once_then_already_rotated() {
        let store = MemoryRefreshStore::new();
        let owner = ObjectId::new();
        let old = record(owner, Duration::days(1));
        let old_id = old.id;
        store.create(old).await.unwrap();

        let first = store.rotate(old_id, record(owner, Duration::days(1))).await.unwrap();
        assert!(matches!(first, RotateOutcome::Rotated(_)));

        let second = store.rotate(old_id, record(owner, Duration::days(1))).await.unwrap();
        assert!(matches!(second, RotateOutcome::AlreadyRotated));

        let missing = store
            .rotate(ObjectId::new(), record(owner, Duration::days(1)))
            .await
            .unwrap();
        assert!(matches!(missing, RotateOutcome::NotFound));
    }

    #[tokio::test]
    async fn rotate_links_chain_and_keeps_one_active() {
        let store = MemoryRefreshStore::new();
        let owner = ObjectId::new();
        let old = record(owner, Duration::days(1));
        let old_id = old.id;
        store.create(old).await.unwrap();

        let successor = record(owner, Duration::days(1));
        let successor_id = successor.id;
        store.rotate(old_id, successor).await.unwrap();

        let active = store.list_active_for_owner(owner).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, successor_id);

        let all = store.records.lock().unwrap();
        let old = all.get(&old_id).unwrap();
        assert_eq!(old.replaced_by, Some(successor_id));
        assert_eq!(old.revoked_reason.as_deref(), Some(REASON_ROTATED));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryRefreshStore::new();
        let rec = record(ObjectId::new(), Duration::days(1));
        let id = rec.id;
        store.create(rec).await.unwrap();

        store.revoke(id, "logout").await.unwrap();
        let first_at = store.records.lock().unwrap().get(&id).unwrap().revoked_at;

        store.revoke(id, "other_reason").await.unwrap();
        let after = store.records.lock().unwrap().get(&id).unwrap().clone();
        assert_eq!(after.revoked_at, first_at);
        assert_eq!(after.revoked_reason.as_deref(), Some("logout"));
    }

    #[tokio::test]
    async fn purge_only_touches_terminal_records() {
        let store = MemoryRefreshStore::new();
        let owner = ObjectId::new();

        let active = record(owner, Duration::days(1));
        let expired_only = record(owner, Duration::days(-1));
        let mut expired_revoked = record(owner, Duration::days(-1));
        expired_revoked.revoked_at = Some(Utc::now() - Duration::days(2));
        let keep_a = active.id;
        let keep_b = expired_only.id;
        store.create(active).await.unwrap();
        store.create(expired_only).await.unwrap();
        store.create(expired_revoked).await.unwrap();

        let purged = store.purge_expired_revoked(Utc::now()).await.unwrap();
        assert_eq!(purged, 1);

        let left = store.records.lock().unwrap();
        assert!(left.contains_key(&keep_a));
        assert!(left.contains_key(&keep_b));
    }
}

//! ConferenceRegistry (C4): the process-wide conference id -> handle map.
//!
//! Grounded on the teacher's `RoomManager.rooms: DashMap<ObjectId, MediaRoom>`
//! (`media/room_manager.rs`), reworked per spec §4.4/§5 and §9's
//! "shared mutable registry" re-architecture note: the map itself
//! (`DashMap`) is lock-free for reads, and a per-conference-id
//! `tokio::sync::Mutex` guards only the `getOrCreate`/`removeIfEmpty`
//! critical section, so everyday lookups never block on conference
//! creation or teardown happening elsewhere.

use crate::conference::{self, ConferenceHandle};
use crate::error::{SfuError, SfuResult};
use crate::worker_pool::WorkerPool;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct ConferenceRegistry {
    conferences: DashMap<String, ConferenceHandle>,
    /// One critical-section lock per conference id currently being
    /// created or torn down. Entries are removed once a conference is
    /// gone so this map doesn't grow unbounded.
    locks: DashMap<String, Arc<Mutex<()>>>,
    worker_pool: Arc<WorkerPool>,
    max_participants_per_conference: u32,
}

impl ConferenceRegistry {
    pub fn new(worker_pool: Arc<WorkerPool>, max_participants_per_conference: u32) -> Self {
        Self {
            conferences: DashMap::new(),
            locks: DashMap::new(),
            worker_pool,
            max_participants_per_conference,
        }
    }

    pub fn active_conference_count(&self) -> usize {
        self.conferences.len()
    }

    /// Spec §4.6: `active_participants` is derived by summing each live
    /// conference's count, never tracked as a separate counter.
    pub async fn total_participant_count(&self) -> usize {
        let handles: Vec<ConferenceHandle> =
            self.conferences.iter().map(|entry| entry.value().clone()).collect();
        let mut total = 0;
        for handle in handles {
            total += handle.participant_count().await;
        }
        total
    }

    pub fn get(&self, id: &str) -> Option<ConferenceHandle> {
        self.conferences.get(id).map(|entry| entry.clone())
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Spec §4.4: atomically creates under lock if absent, acquiring a
    /// worker+router and spawning the conference actor. Returns the
    /// existing handle if the conference already exists (fast path, no
    /// lock taken).
    pub async fn get_or_create(&self, id: &str) -> SfuResult<ConferenceHandle> {
        if id.is_empty() {
            return Err(SfuError::ProtocolError("conferenceId must not be empty".to_string()));
        }

        if let Some(handle) = self.get(id) {
            return Ok(handle);
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: someone may have created it
        // while we were waiting.
        if let Some(handle) = self.get(id) {
            return Ok(handle);
        }

        let (worker_entry, router) = self.worker_pool.acquire().await?;
        let handle = conference::spawn(
            id.to_string(),
            router,
            worker_entry,
            self.max_participants_per_conference,
        );
        self.conferences.insert(id.to_string(), handle.clone());
        info!(conference_id = id, "conference created");
        Ok(handle)
    }

    /// Spec §4.4: invoked by the gateway after each leave. Removal is
    /// conditional on the participant map being empty at the moment of
    /// check, with the same per-id lock held, to avoid resurrecting a
    /// conference a concurrent `get_or_create` just repopulated.
    pub async fn remove_if_empty(&self, id: &str) {
        let Some(lock) = self.locks.get(id).map(|l| l.clone()) else {
            return;
        };
        let _guard = lock.lock().await;

        let Some(handle) = self.get(id) else {
            return;
        };
        if handle.participant_count().await == 0 {
            self.conferences.remove(id);
            self.locks.remove(id);
            info!(conference_id = id, "conference removed (empty)");
        } else {
            debug!(conference_id = id, "conference not removed: still has participants");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaSettings;
    use crate::engine::mock::MockEngine;

    async fn registry(max_participants: u32) -> ConferenceRegistry {
        let engine = MockEngine::new();
        let settings = MediaSettings {
            worker_count: 2,
            ..MediaSettings::default_for_tests()
        };
        let pool = Arc::new(WorkerPool::new(&engine, &settings).await.unwrap());
        ConferenceRegistry::new(pool, max_participants)
    }

    #[tokio::test]
    async fn empty_conference_id_is_a_protocol_error() {
        let registry = registry(0).await;
        let result = registry.get_or_create("").await;
        assert!(matches!(result, Err(SfuError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_handle_on_second_call() {
        let registry = registry(0).await;
        let first = registry.get_or_create("room-1").await.unwrap();
        let second = registry.get_or_create("room-1").await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(registry.active_conference_count(), 1);
    }

    #[tokio::test]
    async fn remove_if_empty_evicts_conferences_with_no_participants() {
        let registry = registry(0).await;
        let handle = registry.get_or_create("room-1").await.unwrap();
        handle
            .join("alice".to_string(), "Alice".to_string(), serde_json::json!({}), "sock-1".to_string())
            .await
            .unwrap();

        registry.remove_if_empty("room-1").await;
        assert_eq!(registry.active_conference_count(), 1, "still has Alice");

        handle.leave("alice".to_string()).await.unwrap();
        registry.remove_if_empty("room-1").await;
        assert_eq!(registry.active_conference_count(), 0);
    }
}

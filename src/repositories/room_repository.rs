//! Repository for rooms.
//!
//! Rooms are never deleted. Each room sits behind its own mutex; the registry
//! holds it across every check-then-mutate sequence so transitions on one room
//! are serialized while other rooms proceed in parallel.

use crate::error::{AppError, AppResult};
use crate::models::{Room, RoomId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct RoomRepository {
    rooms: RwLock<BTreeMap<RoomId, Arc<Mutex<Room>>>>,
    /// Unsettled rooms ordered by end time
    unsettled: RwLock<BTreeSet<(i64, RoomId)>>,
    next_id: AtomicU64,
}

impl Default for RoomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRepository {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            unsettled: RwLock::new(BTreeSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve the next room id. Ids skipped by failed creations stay unused.
    pub fn allocate_id(&self) -> RoomId {
        RoomId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn insert(&self, room: Room) -> Arc<Mutex<Room>> {
        let id = room.id;
        let end_time = room.end_time;
        let handle = Arc::new(Mutex::new(room));
        self.rooms.write().await.insert(id, handle.clone());
        self.unsettled.write().await.insert((end_time, id));
        handle
    }

    /// Lockable handle to a room
    pub async fn handle(&self, id: RoomId) -> AppResult<Arc<Mutex<Room>>> {
        self.rooms
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", id)))
    }

    /// Snapshot of a room
    pub async fn find_by_id(&self, id: RoomId) -> Option<Room> {
        let handle = self.rooms.read().await.get(&id).cloned()?;
        let room = handle.lock().await;
        Some(room.clone())
    }

    /// All room ids, ascending
    pub async fn ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().copied().collect()
    }

    pub async fn count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop a room from the settlement index once it is settled
    pub async fn mark_settled(&self, id: RoomId, end_time: i64) {
        self.unsettled.write().await.remove(&(end_time, id));
    }

    /// Unsettled rooms whose window ended strictly before `now`, earliest
    /// deadline first. Clone the iterator to walk it again.
    pub async fn pending_settlement(&self, now: i64) -> impl Iterator<Item = RoomId> + Clone {
        let ids: Vec<RoomId> = self
            .unsettled
            .read()
            .await
            .range(..(now, RoomId(0)))
            .map(|(_, id)| *id)
            .collect();
        ids.into_iter()
    }
}

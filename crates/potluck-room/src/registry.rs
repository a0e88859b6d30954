//! The room registry: creates rooms with collision-free identifiers,
//! looks them up, and deregisters them when their lifecycle ends.
//!
//! All synchronization is private to the type; callers never see or
//! manage a lock. Rooms for different identifiers never contend beyond
//! the brief map access.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;

use crate::{Link, Room, RoomConfig, RoomError};

/// Length of generated room identifiers.
const ROOM_ID_LEN: usize = 8;

/// Creates, tracks, and removes rooms. Cheap to clone; all clones share
/// the same map.
pub struct Registry<L: Link> {
    rooms: Arc<Mutex<HashMap<String, Arc<Room<L>>>>>,
}

impl<L: Link> Registry<L> {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a room with a fresh identifier and spawns its lifecycle
    /// task. The task's wrapper deregisters the room when the
    /// lifecycle returns.
    ///
    /// Identifier generation retries on collision while holding the map
    /// lock, making generation and insertion atomic relative to other
    /// creates: two concurrent calls can never pick the same id.
    pub async fn create(&self, config: RoomConfig) -> Arc<Room<L>> {
        let config = config.validated();
        let mut rooms = self.rooms.lock().await;

        let id = loop {
            let candidate = generate_id();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let room = Arc::new(Room::new(id.clone(), config));
        rooms.insert(id, Arc::clone(&room));

        let map = Arc::clone(&self.rooms);
        let lifecycle = Arc::clone(&room);
        tokio::spawn(async move {
            Arc::clone(&lifecycle).run().await;
            map.lock().await.remove(lifecycle.id());
            tracing::info!(room_id = %lifecycle.id(), "room deregistered");
        });

        tracing::info!(room_id = %room.id(), "room created");
        room
    }

    /// Looks a room up and reserves one capacity slot on it.
    ///
    /// Fails with [`RoomError::NotFound`] for an unknown id, and with
    /// [`RoomError::Full`] (the reservation rolled back) when every
    /// slot is taken.
    pub async fn lookup_and_reserve(&self, id: &str) -> Result<Arc<Room<L>>, RoomError> {
        let room = self
            .rooms
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(id.to_string()))?;
        room.reserve()?;
        Ok(room)
    }

    /// Deregisters a room. Idempotent: removing twice, or removing an
    /// id that never existed, is a no-op.
    pub async fn remove(&self, id: &str) {
        if self.rooms.lock().await.remove(id).is_some() {
            tracing::info!(room_id = id, "room removed from registry");
        }
    }

    /// Number of registered rooms.
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.rooms.lock().await.contains_key(id)
    }
}

impl<L: Link> Clone for Registry<L> {
    fn clone(&self) -> Self {
        Self {
            rooms: Arc::clone(&self.rooms),
        }
    }
}

impl<L: Link> Default for Registry<L> {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_id() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(char::from)
        .collect()
}

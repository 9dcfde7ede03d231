//! Typed access to sessions and their telemetry chunks

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{KeyValueStore, MemoryStore, SESSION_PREFIX, chunk_count_key, chunk_key, session_key};
use crate::types::{Session, TelemetryFrame};
use crate::{Result, TelemetryError};

fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| TelemetryError::serialization_error(key, e)),
        None => Ok(None),
    }
}

fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).map_err(|e| TelemetryError::serialization_error(key, e))?;
    store.set(key, &json)
}

type LiveSet = Arc<Mutex<HashSet<String>>>;

/// Sessions and chunks on top of a [`KeyValueStore`]. Cheap to clone.
///
/// Clones also share which sessions a running recorder currently owns, see
/// [`SessionRepository::claim`].
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn KeyValueStore>,
    live: LiveSet,
}

/// Marks a session as owned by a running recorder until dropped.
#[derive(Debug)]
pub struct RecordingLease {
    live: LiveSet,
    session_id: String,
}

impl Drop for RecordingLease {
    fn drop(&mut self) {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.session_id);
    }
}

impl std::fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRepository").finish_non_exhaustive()
    }
}

impl SessionRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, live: LiveSet::default() }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        write_json(self.store.as_ref(), &session_key(&session.id), session)
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        read_json(self.store.as_ref(), &session_key(session_id))
    }

    /// Every stored session, oldest first. Unreadable entries are skipped.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for key in self.store.keys_with_prefix(SESSION_PREFIX)? {
            match read_json::<Session>(self.store.as_ref(), &key) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable session"),
            }
        }
        sessions.sort_by_key(|session| session.started_at);
        Ok(sessions)
    }

    /// Remove a session and all of its chunks.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let chunks = self.chunk_log(session_id);
        chunks.clear()?;
        self.store.remove(&session_key(session_id))?;
        info!(session_id, "Session deleted");
        Ok(())
    }

    /// Record that `session_id` is being written by a live recorder.
    pub fn claim(&self, session_id: &str) -> RecordingLease {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).insert(session_id.to_string());
        RecordingLease { live: Arc::clone(&self.live), session_id: session_id.to_string() }
    }

    /// Whether a recorder sharing this repository still owns `session_id`.
    ///
    /// Ownership is process-local: after a restart no session is live.
    pub fn is_live(&self, session_id: &str) -> bool {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).contains(session_id)
    }

    pub fn chunk_log(&self, session_id: &str) -> ChunkLog {
        ChunkLog { store: Arc::clone(&self.store), session_id: session_id.to_string() }
    }
}

/// Append-only sequence of frame chunks for one session.
///
/// A chunk is written before the count is advanced, so a failed append leaves
/// the count unchanged and the next append reuses the same index.
#[derive(Clone)]
pub struct ChunkLog {
    store: Arc<dyn KeyValueStore>,
    session_id: String,
}

impl ChunkLog {
    /// Number of chunks committed so far.
    pub fn len(&self) -> Result<u32> {
        Ok(read_json::<u32>(self.store.as_ref(), &chunk_count_key(&self.session_id))?.unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Commit `frames` as the next chunk and return its index.
    pub fn append(&self, frames: &[TelemetryFrame]) -> Result<u32> {
        let index = self.len()?;
        write_json(self.store.as_ref(), &chunk_key(&self.session_id, index), &frames)?;
        write_json(self.store.as_ref(), &chunk_count_key(&self.session_id), &(index + 1))?;
        debug!(session_id = %self.session_id, index, frames = frames.len(), "Chunk written");
        Ok(index)
    }

    pub fn read(&self, index: u32) -> Result<Vec<TelemetryFrame>> {
        let key = chunk_key(&self.session_id, index);
        read_json(self.store.as_ref(), &key)?
            .ok_or_else(|| TelemetryError::storage_error(key, "chunk missing"))
    }

    /// All committed frames in recording order.
    pub fn read_all(&self) -> Result<Vec<TelemetryFrame>> {
        let mut frames = Vec::new();
        for index in 0..self.len()? {
            frames.extend(self.read(index)?);
        }
        Ok(frames)
    }

    /// Remove every chunk, including ones written by a failed append.
    pub fn clear(&self) -> Result<()> {
        let prefix = format!("telemetry:{}:", self.session_id);
        for key in self.store.keys_with_prefix(&prefix)? {
            self.store.remove(&key)?;
        }
        Ok(())
    }
}

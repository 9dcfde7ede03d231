//! Local persistence for recorded sessions.
//!
//! Everything is stored as JSON text under flat string keys:
//!
//! | Key                          | Value                                 |
//! |------------------------------|---------------------------------------|
//! | `session:{id}`               | [`Session`](crate::Session)           |
//! | `telemetry:{id}:{n}`         | chunk `n`, an array of frames         |
//! | `telemetry:{id}:chunks`      | number of chunks written              |
//!
//! [`KeyValueStore`] is the seam: [`MemoryStore`] backs tests and ephemeral
//! clients, [`FileStore`] writes one file per key.

mod file;
mod memory;
mod repository;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use repository::{ChunkLog, RecordingLease, SessionRepository};

use crate::Result;

/// Prefix of every session key.
pub const SESSION_PREFIX: &str = "session:";

pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

pub fn chunk_key(session_id: &str, index: u32) -> String {
    format!("telemetry:{session_id}:{index}")
}

pub fn chunk_count_key(session_id: &str) -> String {
    format!("telemetry:{session_id}:chunks")
}

/// Synchronous string key-value store.
///
/// Writes happen inside the driver task between datagrams, so implementations
/// should be fast and must not block on the network.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite `key`. A successful return means the value is durable.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

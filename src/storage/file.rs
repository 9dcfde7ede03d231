//! One-file-per-key store on the local filesystem

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::KeyValueStore;
use crate::{Result, TelemetryError};

const EXTENSION: &str = "json";

/// Store that keeps each key in `{dir}/{key}.json`, with `:` written as `.`.
///
/// Writes go to a temporary file that is renamed over the target, so a crash
/// mid-write leaves the previous value in place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| TelemetryError::storage_io_error(dir.display().to_string(), e))?;
        debug!(dir = %dir.display(), "File store opened");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_'));
        if !valid {
            return Err(TelemetryError::storage_error(key, "key contains unsupported characters"));
        }
        Ok(self.dir.join(format!("{}.{EXTENSION}", key.replace(':', "."))))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TelemetryError::storage_io_error(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| TelemetryError::storage_io_error(key, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(TelemetryError::storage_io_error(key, e));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TelemetryError::storage_io_error(key, e)),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| TelemetryError::storage_io_error(prefix, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable store entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let key = stem.replace('.', ":");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open");
        store.set("session:abc-1", "{\"id\":\"abc-1\"}").unwrap();
        store.set("telemetry:abc-1:0", "[]").unwrap();
        store.set("telemetry:abc-1:chunks", "1").unwrap();

        let reopened = FileStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get("session:abc-1").unwrap().as_deref(), Some("{\"id\":\"abc-1\"}"));
        assert_eq!(reopened.keys_with_prefix("session:").unwrap(), vec!["session:abc-1"]);
        assert_eq!(
            reopened.keys_with_prefix("telemetry:abc-1:").unwrap(),
            vec!["telemetry:abc-1:0", "telemetry:abc-1:chunks"]
        );
        assert!(dir.path().join("session.abc-1.json").exists());
    }

    #[test]
    fn missing_keys_and_removal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open");
        assert_eq!(store.get("session:none").unwrap(), None);
        store.remove("session:none").unwrap();

        store.set("session:x", "1").unwrap();
        store.remove("session:x").unwrap();
        assert_eq!(store.get("session:x").unwrap(), None);
    }

    #[test]
    fn path_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open");
        assert!(matches!(store.set("../escape", "1"), Err(TelemetryError::Storage { .. })));
        assert!(matches!(store.get(""), Err(TelemetryError::Storage { .. })));
    }
}

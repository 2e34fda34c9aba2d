//! Durable key/value storage for session tokens

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StorageError;

type StorageResult<T> = std::result::Result<T, StorageError>;

/// String slots that survive restarts.
///
/// `set_many` and `remove_many` exist so backends can apply a whole token
/// pair in one write; the defaults fall back to one call per slot.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    async fn set_many(&self, entries: &[(&str, String)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Process-local storage, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.slots().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.slots().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.slots().remove(key);
        Ok(())
    }
}

/// Tokens kept in a JSON object on disk.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// crash mid-write leaves the previous contents. A file that cannot be parsed
/// reads as empty (the user is treated as logged out).
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles
    lock: tokio::sync::Mutex<()>,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `tokens.json` in the platform data directory, if one can be determined
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "Adoption", "adoption")
            .map(|dirs| dirs.data_dir().join("tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_slots(&self) -> StorageResult<HashMap<String, String>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(slots) => Ok(slots),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Token file is corrupt, ignoring it");
                Ok(HashMap::new())
            }
        }
    }

    async fn write_slots(&self, slots: &HashMap<String, String>) -> StorageResult<()> {
        if slots.is_empty() {
            return match fs::remove_file(&self.path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, serde_json::to_vec(slots)?).await?;

        // Tokens are credentials: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), slots = slots.len(), "Token file written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_slots().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_many(&[(key, value.to_string())]).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.remove_many(&[key]).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut slots = self.read_slots().await?;
        for (key, value) in entries {
            slots.insert(key.to_string(), value.clone());
        }
        self.write_slots(&slots).await
    }

    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut slots = self.read_slots().await?;
        let before = slots.len();
        for key in keys {
            slots.remove(*key);
        }
        if slots.len() == before {
            return Ok(());
        }
        self.write_slots(&slots).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryTokenStorage::new();
        assert_eq!(storage.get("access_token").await.unwrap(), None);

        storage.set("access_token", "abc").await.unwrap();
        assert_eq!(
            storage.get("access_token").await.unwrap().as_deref(),
            Some("abc")
        );

        storage.remove("access_token").await.unwrap();
        assert_eq!(storage.get("access_token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let storage = FileTokenStorage::new(&path);
        storage
            .set_many(&[
                ("access_token", "a-1".to_string()),
                ("refresh_token", "r-1".to_string()),
            ])
            .await
            .unwrap();
        assert!(path.exists());
        assert!(!storage.temp_path().exists());

        let reopened = FileTokenStorage::new(&path);
        assert_eq!(
            reopened.get("refresh_token").await.unwrap().as_deref(),
            Some("r-1")
        );
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens.json"));
        assert_eq!(storage.get("access_token").await.unwrap(), None);
        // Removing from a store that was never written is a no-op
        storage.remove("access_token").await.unwrap();
        assert!(!storage.path().exists());
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, b"{\"access_token\": ").await.unwrap();

        let storage = FileTokenStorage::new(&path);
        assert_eq!(storage.get("access_token").await.unwrap(), None);

        // The next write replaces the corrupt contents
        storage.set("access_token", "a-2").await.unwrap();
        assert_eq!(
            storage.get("access_token").await.unwrap().as_deref(),
            Some("a-2")
        );
    }

    #[tokio::test]
    async fn test_file_storage_removes_file_when_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let storage = FileTokenStorage::new(&path);

        storage.set("access_token", "a-1").await.unwrap();
        storage.set("refresh_token", "r-1").await.unwrap();
        storage
            .remove_many(&["access_token", "refresh_token"])
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_storage_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let storage = FileTokenStorage::new(&path);
        storage.set("access_token", "a-1").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

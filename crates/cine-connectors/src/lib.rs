use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use cine_api::{CineError, CredentialStore, RefreshRecord, SecretStore};
use tracing::{debug, error};

pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, CineError> {
        std::env::var(secret_ref).map_err(|_| {
            CineError::Configuration(format!("missing secret env var {secret_ref}"))
        })
    }
}

/// Fixed secrets, for tests and embedding.
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: BTreeMap<String, String>,
}

impl StaticSecretStore {
    #[must_use]
    pub fn with(mut self, secret_ref: &str, value: &str) -> Self {
        self.secrets.insert(secret_ref.to_string(), value.to_string());
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, CineError> {
        self.secrets
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| CineError::Configuration(format!("missing secret {secret_ref}")))
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<BTreeMap<String, RefreshRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, CineError> {
        let guard = self
            .records
            .read()
            .map_err(|_| CineError::Storage("credential map poisoned".to_string()))?;
        Ok(guard.len())
    }

    pub fn is_empty(&self) -> Result<bool, CineError> {
        Ok(self.len()? == 0)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save(
        &self,
        subject_id: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<(), CineError> {
        let record = RefreshRecord {
            subject_id: subject_id.to_string(),
            credential_value: credential_value.to_string(),
            expires_at: expires_at.to_string(),
        };
        let mut guard = self
            .records
            .write()
            .map_err(|_| CineError::Storage("credential map poisoned".to_string()))?;
        guard.insert(record.subject_id.clone(), record);
        debug!(subject_id, "refresh record stored in memory");
        Ok(())
    }

    fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<RefreshRecord>, CineError> {
        let guard = self
            .records
            .read()
            .map_err(|_| CineError::Storage("credential map poisoned".to_string()))?;
        Ok(guard.get(subject_id).cloned())
    }

    fn replace_if_current(
        &self,
        subject_id: &str,
        expected: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<bool, CineError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| CineError::Storage("credential map poisoned".to_string()))?;
        let Some(record) = guard
            .get_mut(subject_id)
            .filter(|r| r.credential_value == expected)
        else {
            debug!(subject_id, "stale credential, record left in place");
            return Ok(false);
        };
        record.credential_value = credential_value.to_string();
        record.expires_at = expires_at.to_string();
        debug!(subject_id, "refresh record replaced in memory");
        Ok(true)
    }
}

/// Credential records kept in one JSON document.
///
/// Each save rewrites the document through a temporary file and a rename, so a
/// reader sees either the previous or the new record set, never a partial one.
pub struct JsonFileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<BTreeMap<String, RefreshRecord>, CineError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            CineError::Storage(format!("failed to read {}: {e}", self.path.display()))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            CineError::Storage(format!("corrupt credential file {}: {e}", self.path.display()))
        })
    }

    fn persist_all(&self, records: &BTreeMap<String, RefreshRecord>) -> Result<(), CineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CineError::Storage(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let body = serde_json::to_vec_pretty(records)
            .map_err(|e| CineError::Internal(format!("failed to encode records: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = create_private(&temp_path).map_err(|e| {
            CineError::Storage(format!("failed to create {}: {e}", temp_path.display()))
        })?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                CineError::Storage(format!("failed to write {}: {e}", temp_path.display()))
            })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            CineError::Storage(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

impl CredentialStore for JsonFileCredentialStore {
    fn save(
        &self,
        subject_id: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<(), CineError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CineError::Storage("credential file lock poisoned".to_string()))?;

        let mut records = self.load_all()?;
        records.insert(
            subject_id.to_string(),
            RefreshRecord {
                subject_id: subject_id.to_string(),
                credential_value: credential_value.to_string(),
                expires_at: expires_at.to_string(),
            },
        );
        self.persist_all(&records).inspect_err(|e| {
            error!(subject_id, path = %self.path.display(), "credential write failed: {e}");
        })?;
        debug!(subject_id, path = %self.path.display(), "refresh record stored");
        Ok(())
    }

    fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<RefreshRecord>, CineError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CineError::Storage("credential file lock poisoned".to_string()))?;
        Ok(self.load_all()?.remove(subject_id))
    }

    fn replace_if_current(
        &self,
        subject_id: &str,
        expected: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<bool, CineError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CineError::Storage("credential file lock poisoned".to_string()))?;

        let mut records = self.load_all()?;
        let Some(record) = records
            .get_mut(subject_id)
            .filter(|r| r.credential_value == expected)
        else {
            debug!(subject_id, "stale credential, record left in place");
            return Ok(false);
        };
        record.credential_value = credential_value.to_string();
        record.expires_at = expires_at.to_string();
        self.persist_all(&records).inspect_err(|e| {
            error!(subject_id, path = %self.path.display(), "credential write failed: {e}");
        })?;
        debug!(subject_id, path = %self.path.display(), "refresh record replaced");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn exercise(store: &dyn CredentialStore) {
        store.save("u1", "token-a", "Mon, 01 Jan 2030 00:00:00 GMT").unwrap();
        let rec = store.find_by_subject_id("u1").unwrap().unwrap();
        assert_eq!(rec.credential_value, "token-a");

        store.save("u1", "token-b", "Tue, 02 Jan 2030 00:00:00 GMT").unwrap();
        let rec = store.find_by_subject_id("u1").unwrap().unwrap();
        assert_eq!(rec.credential_value, "token-b");
        assert_eq!(rec.expires_at, "Tue, 02 Jan 2030 00:00:00 GMT");

        assert!(store.find_by_subject_id("nobody").unwrap().is_none());

        assert!(!store.replace_if_current("u1", "token-a", "token-c", "later").unwrap());
        assert!(!store.replace_if_current("nobody", "token-b", "token-c", "later").unwrap());
        assert!(store.find_by_subject_id("nobody").unwrap().is_none());
        assert!(store.replace_if_current("u1", "token-b", "token-c", "later").unwrap());
        let rec = store.find_by_subject_id("u1").unwrap().unwrap();
        assert_eq!(rec.credential_value, "token-c");
        assert_eq!(rec.expires_at, "later");
        store.save("u1", "token-b", "Tue, 02 Jan 2030 00:00:00 GMT").unwrap();
    }

    #[test]
    fn memory_store_upserts() {
        let store = InMemoryCredentialStore::new();
        exercise(&store);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn file_store_upserts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("creds.json");
        let store = JsonFileCredentialStore::new(&path);
        exercise(&store);

        let reopened = JsonFileCredentialStore::new(&path);
        let rec = reopened.find_by_subject_id("u1").unwrap().unwrap();
        assert_eq!(rec.credential_value, "token-b");

        let raw: BTreeMap<String, RefreshRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = JsonFileCredentialStore::new(&path);
        store.save("u1", "t", "x").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonFileCredentialStore::new(&path);
        assert!(matches!(
            store.find_by_subject_id("u1"),
            Err(CineError::Storage(_))
        ));
        assert!(matches!(
            store.save("u1", "t", "x"),
            Err(CineError::Storage(_))
        ));
    }

    #[test]
    fn concurrent_saves_leave_one_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileCredentialStore::new(dir.path().join("creds.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let value = format!("token-{i}");
                    store.save("u1", &value, &format!("exp-{i}")).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let rec = store.find_by_subject_id("u1").unwrap().unwrap();
        let suffix = rec.credential_value.trim_start_matches("token-");
        assert_eq!(rec.expires_at, format!("exp-{suffix}"));
    }

    fn only_one_swap_wins(store: Arc<dyn CredentialStore>) {
        store.save("u1", "token-a", "x").unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .replace_if_current("u1", "token-a", &format!("token-{i}"), "y")
                        .unwrap()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_ne!(
            store.find_by_subject_id("u1").unwrap().unwrap().credential_value,
            "token-a"
        );
    }

    #[test]
    fn concurrent_swaps_have_a_single_winner() {
        only_one_swap_wins(Arc::new(InMemoryCredentialStore::new()));
        let dir = tempfile::tempdir().unwrap();
        only_one_swap_wins(Arc::new(JsonFileCredentialStore::new(
            dir.path().join("creds.json"),
        )));
    }

    #[test]
    fn secret_stores() {
        let secrets = StaticSecretStore::default().with("K", "v");
        assert_eq!(secrets.get("K").unwrap(), "v");
        assert!(matches!(
            secrets.get("missing"),
            Err(CineError::Configuration(_))
        ));
        assert!(EnvSecretStore
            .get("CINE_TEST_SURELY_UNSET_VARIABLE")
            .is_err());
    }
}

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::keys::{KeyError, KeyPair};

const PEM_EXTENSION: &str = "pem";

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("no key pair configured for '{0}'")]
    NotFound(String),
    #[error("a key pair already exists for '{0}'")]
    AlreadyExists(String),
    #[error("invalid key id '{0}': use letters, digits, '-' and '_'")]
    InvalidId(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("failed to read or write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Key pairs keyed by integration id.
///
/// Reads take a shared lock just long enough to clone an `Arc`; a request that
/// resolved a pair keeps it alive after it is rotated out.
#[derive(Debug, Default)]
pub struct KeyStore {
    pairs: RwLock<HashMap<String, Arc<KeyPair>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and store a fresh pair for `id`.
    ///
    /// Fails with [`KeyStoreError::AlreadyExists`] if `id` is taken; use
    /// [`KeyStore::rotate`] to replace a pair.
    pub fn generate(&self, id: &str) -> Result<Arc<KeyPair>, KeyStoreError> {
        validate_id(id)?;
        // keygen is slow, keep it outside the lock
        let pair = Arc::new(KeyPair::generate()?);
        match self.pairs.write().entry(id.to_string()) {
            Entry::Occupied(_) => Err(KeyStoreError::AlreadyExists(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(pair.clone());
                tracing::info!(key_id = id, "generated key pair");
                Ok(pair)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<KeyPair>> {
        self.pairs.read().get(id).cloned()
    }

    /// Like [`KeyStore::get`], with a miss reported as an error
    pub fn require(&self, id: &str) -> Result<Arc<KeyPair>, KeyStoreError> {
        self.get(id)
            .ok_or_else(|| KeyStoreError::NotFound(id.to_string()))
    }

    /// Store `pair` under `id`, returning the pair it replaced
    pub fn put(&self, id: &str, pair: KeyPair) -> Result<Option<Arc<KeyPair>>, KeyStoreError> {
        validate_id(id)?;
        Ok(self.pairs.write().insert(id.to_string(), Arc::new(pair)))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<KeyPair>> {
        self.pairs.write().remove(id)
    }

    /// Replace the pair for `id` with a fresh one and return the retired pair
    pub fn rotate(&self, id: &str) -> Result<Arc<KeyPair>, KeyStoreError> {
        if !self.contains(id) {
            return Err(KeyStoreError::NotFound(id.to_string()));
        }
        let fresh = KeyPair::generate()?;
        let previous = self
            .put(id, fresh)?
            .ok_or_else(|| KeyStoreError::NotFound(id.to_string()))?;
        tracing::info!(key_id = id, "rotated key pair");
        Ok(previous)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pairs.read().contains_key(id)
    }

    /// Sorted ids of every stored pair
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pairs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }

    /// Load every `<id>.pem` private key in `dir`.
    ///
    /// Files with other extensions are skipped. Returns the number of pairs loaded.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, KeyStoreError> {
        let entries = std::fs::read_dir(dir).map_err(|source| KeyStoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| KeyStoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PEM_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let pem = std::fs::read_to_string(&path).map_err(|source| KeyStoreError::Io {
                path: path.clone(),
                source,
            })?;
            self.put(id, KeyPair::from_pem(&pem)?)?;
            tracing::debug!(key_id = id, "loaded key pair");
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Write the private key PEM for `id` to `<dir>/<id>.pem`.
    ///
    /// On unix the file is created with mode 0600.
    pub fn save_pem(&self, id: &str, dir: &Path) -> Result<PathBuf, KeyStoreError> {
        let pair = self.require(id)?;
        let pem = pair.private_key_pem()?;
        let path = dir.join(format!("{}.{}", id, PEM_EXTENSION));
        write_private(&path, pem.as_bytes()).map_err(|source| KeyStoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn validate_id(id: &str) -> Result<(), KeyStoreError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(KeyStoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_and_get() {
        let store = KeyStore::new();
        assert!(store.is_empty());

        let pair = store.generate("acme").unwrap();
        let fetched = store.get("acme").unwrap();
        assert!(Arc::ptr_eq(&pair, &fetched));
        assert_eq!(store.len(), 1);
        assert!(store.get("other").is_none());
        assert!(matches!(
            store.require("other"),
            Err(KeyStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_generate_does_not_overwrite() {
        let store = KeyStore::new();
        store.generate("acme").unwrap();
        assert!(matches!(
            store.generate("acme"),
            Err(KeyStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_rotate_keeps_retired_pair_alive() {
        let store = KeyStore::new();
        let original = store.generate("acme").unwrap();
        let in_flight = store.get("acme").unwrap();

        let retired = store.rotate("acme").unwrap();
        assert!(Arc::ptr_eq(&retired, &original));
        assert_ne!(
            store.get("acme").unwrap().public_key_der().unwrap(),
            in_flight.public_key_der().unwrap()
        );
        assert!(matches!(
            store.rotate("missing"),
            Err(KeyStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let store = KeyStore::new();
        for id in ["", "../etc", "a b", "x.pem"] {
            assert!(matches!(
                store.generate(id),
                Err(KeyStoreError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn test_save_and_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new();
        store.generate("shop_1").unwrap();
        let path = store.save_pem("shop_1", dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reloaded = KeyStore::new();
        assert_eq!(reloaded.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(reloaded.ids(), vec!["shop_1".to_string()]);
        assert_eq!(
            reloaded.get("shop_1").unwrap().public_key_der().unwrap(),
            store.get("shop_1").unwrap().public_key_der().unwrap()
        );
    }

    #[test]
    fn test_remove() {
        let store = KeyStore::new();
        store.generate("acme").unwrap();
        assert!(store.remove("acme").is_some());
        assert!(store.remove("acme").is_none());
        assert!(!store.contains("acme"));
    }
}

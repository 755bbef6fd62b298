use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{file_path_for, ContentStore, StorageError, StoredObject};

/// Files under one directory, named `<prefix>-<uuid>.pdf`.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, storage_id: &str) -> Result<PathBuf, StorageError> {
        validate_id(storage_id)?;
        Ok(self.root.join(storage_id))
    }
}

/// Identifiers are single path components of `[A-Za-z0-9._-]`, never
/// starting with a dot.
fn validate_id(storage_id: &str) -> Result<(), StorageError> {
    let valid = !storage_id.is_empty()
        && !storage_id.starts_with('.')
        && storage_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(storage_id.to_string()))
    }
}

impl ContentStore for LocalContentStore {
    fn put(&self, prefix: &str, bytes: &[u8]) -> Result<StoredObject, StorageError> {
        let storage_id = format!("{prefix}-{}.pdf", Uuid::new_v4());
        let path = self.path_for(&storage_id)?;

        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("pdf.part");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(storage_id = %storage_id, size = bytes.len(), "Content stored");

        Ok(StoredObject {
            url: file_path_for(&storage_id),
            storage_id,
        })
    }

    fn get(&self, storage_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(storage_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, storage_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(storage_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(storage_id = %storage_id, "Content removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, LocalContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().join("storage")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_delete() {
        let (_dir, store) = setup();
        let obj = store.put("prescription", b"%PDF-1.3 test").unwrap();
        assert!(obj.storage_id.starts_with("prescription-"));
        assert_eq!(obj.url, format!("/api/files/{}", obj.storage_id));

        assert_eq!(store.get(&obj.storage_id).unwrap(), b"%PDF-1.3 test");

        store.delete(&obj.storage_id).unwrap();
        assert!(matches!(store.get(&obj.storage_id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete(&obj.storage_id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn ids_are_unique_per_put() {
        let (_dir, store) = setup();
        let a = store.put("lab_report", b"a").unwrap();
        let b = store.put("lab_report", b"b").unwrap();
        assert_ne!(a.storage_id, b.storage_id);
    }

    #[test]
    fn traversal_ids_rejected() {
        let (_dir, store) = setup();
        for bad in ["../secret", "a/b", "", ".hidden", "a\\b"] {
            assert!(
                matches!(store.get(bad), Err(StorageError::InvalidId(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn no_partial_files_left_behind() {
        let (_dir, store) = setup();
        store.put("prescription", b"x").unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

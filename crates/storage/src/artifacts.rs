//! Artifact Store

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::StorageError;

/// Reads and writes fitted artifacts as postcard blobs
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactStore;

impl ArtifactStore {
    /// Serialize `value` to `path`, creating parent directories as needed
    pub fn save<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes = postcard::to_allocvec(value)?;
        fs::write(path, &bytes).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Saved artifact to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Deserialize an artifact previously written by [`save`](Self::save)
    pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, StorageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        debug!("Loaded {} bytes from {}", bytes.len(), path.display());
        Ok(postcard::from_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Fitted {
        name: String,
        weights: Vec<f64>,
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("nested").join("model.bin");
        let fitted = Fitted {
            name: "linear".to_string(),
            weights: vec![0.25, -1.5],
        };

        ArtifactStore::save(&fitted, &path).unwrap();
        let loaded: Fitted = ArtifactStore::load(&path).unwrap();
        assert_eq!(loaded, fitted);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Fitted, _> = ArtifactStore::load(dir.path().join("absent.bin"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, [0xff]).unwrap();

        let result: Result<Fitted, _> = ArtifactStore::load(&path);
        assert!(matches!(result, Err(StorageError::SerializationError(_))));
    }
}

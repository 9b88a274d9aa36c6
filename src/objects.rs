//! Blob storage for uploaded documents. The registry only ever holds a
//! [`StorageRef`]; bytes live behind an [`ObjectStore`].

use std::{fmt, path::PathBuf};

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque handle returned by [`ObjectStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(String);

impl StorageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage reference `{0}`")]
    InvalidReference(String),

    #[error("object `{0}` not found")]
    NotFound(String),
}

pub trait ObjectStore: Send + Sync {
    fn put<'a>(
        &'a self,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<StorageRef, ObjectStoreError>>;

    fn get<'a>(&'a self, reference: &'a StorageRef)
    -> BoxFuture<'a, Result<Vec<u8>, ObjectStoreError>>;

    fn delete<'a>(&'a self, reference: &'a StorageRef)
    -> BoxFuture<'a, Result<(), ObjectStoreError>>;

    /// Public URL clients use to download the object.
    fn url_for(&self, reference: &StorageRef) -> String;
}

/// Stores objects as flat files under a single directory.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Maps a reference back onto the storage root, refusing anything that
    /// could escape it.
    pub fn resolve(&self, reference: &StorageRef) -> Result<PathBuf, ObjectStoreError> {
        let raw = reference.as_str();
        let invalid = raw.is_empty()
            || raw.contains('/')
            || raw.contains('\\')
            || raw.contains("..")
            || sanitize_filename::sanitize(raw) != raw;
        if invalid {
            return Err(ObjectStoreError::InvalidReference(raw.to_string()));
        }
        Ok(self.root.join(raw))
    }
}

fn stored_name(file_name: &str) -> String {
    let mut sanitized = sanitize_filename::sanitize(file_name).replace(' ', "_");
    if sanitized.is_empty() {
        sanitized = "document.pdf".to_string();
    }
    format!("{}_{}", Uuid::new_v4().simple(), sanitized)
}

impl ObjectStore for LocalObjectStore {
    fn put<'a>(
        &'a self,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<StorageRef, ObjectStoreError>> {
        async move {
            tokio::fs::create_dir_all(&self.root).await?;
            let reference = StorageRef::new(stored_name(file_name));
            let path = self.resolve(&reference)?;
            tokio::fs::write(&path, bytes).await?;
            debug!(file = %path.display(), size = bytes.len(), "stored object");
            Ok(reference)
        }
        .boxed()
    }

    fn get<'a>(
        &'a self,
        reference: &'a StorageRef,
    ) -> BoxFuture<'a, Result<Vec<u8>, ObjectStoreError>> {
        async move {
            let path = self.resolve(reference)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(ObjectStoreError::NotFound(reference.to_string()))
                }
                Err(err) => Err(err.into()),
            }
        }
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        reference: &'a StorageRef,
    ) -> BoxFuture<'a, Result<(), ObjectStoreError>> {
        async move {
            let path = self.resolve(reference)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!(file = %path.display(), "object already missing on delete");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
        .boxed()
    }

    fn url_for(&self, reference: &StorageRef) -> String {
        format!("{}/files/{}", self.public_base_url, reference)
    }
}

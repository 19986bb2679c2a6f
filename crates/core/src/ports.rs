//! Capabilities the pipeline consumes from external collaborators.

use bytes::Bytes;

use crate::error::{PersistenceError, StorageError};
use crate::types::{CatalogRecord, Locator};

/// Durable object storage addressed by key.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store `bytes` under `key`. Once this returns, a read of `key` sees
    /// the complete object.
    async fn put(&self, bytes: Bytes, key: &str, content_type: &str)
    -> Result<Locator, StorageError>;

    /// Remove `key`. Removing a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// The catalog that keeps one record per finished job.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist `record`, returning its catalog id.
    async fn save(&self, record: &CatalogRecord) -> Result<String, PersistenceError>;
}

/// Reject keys that could escape a key namespace.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Join a public base URL and a key.
pub fn locator_for(base_url: &str, key: &str) -> Locator {
    Locator {
        key: key.to_string(),
        url: format!("{}/{}", base_url.trim_end_matches('/'), key),
    }
}

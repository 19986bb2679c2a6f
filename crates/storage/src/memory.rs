use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use vodpack_core::ports::{locator_for, validate_key};
use vodpack_core::{Locator, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// One completed call against the store, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobOp {
    Put(String),
    Delete(String),
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    history: Vec<BlobOp>,
}

/// In-process blob store with an operation log.
///
/// Puts for keys containing any configured failure pattern return a
/// backend error; an optional delay is applied to every put.
#[derive(Debug)]
pub struct MemoryBlobStore {
    base_url: String,
    inner: Mutex<Inner>,
    fail_patterns: Vec<String>,
    put_delay: Option<Duration>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            inner: Mutex::new(Inner::default()),
            fail_patterns: Vec::new(),
            put_delay: None,
        }
    }

    /// Fail every put whose key contains `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_patterns.push(pattern.into());
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    pub fn history(&self) -> Vec<BlobOp> {
        self.lock().history.clone()
    }

    /// Keys that were successfully put, in completion order.
    pub fn put_order(&self) -> Vec<String> {
        self.lock()
            .history
            .iter()
            .filter_map(|op| match op {
                BlobOp::Put(k) => Some(k.clone()),
                BlobOp::Delete(_) => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl vodpack_core::ports::BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<Locator, StorageError> {
        validate_key(key)?;
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_patterns.iter().any(|p| key.contains(p.as_str())) {
            return Err(StorageError::Backend(format!("injected failure for {key}")));
        }

        let mut inner = self.lock();
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        inner.history.push(BlobOp::Put(key.to_string()));
        Ok(locator_for(&self.base_url, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut inner = self.lock();
        inner.objects.remove(key);
        inner.history.push(BlobOp::Delete(key.to_string()));
        Ok(())
    }
}

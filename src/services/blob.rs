// Revocable in-memory binary handles
//
// The display layer never holds annotated image bytes directly. It receives a
// BlobHandle and resolves it through the store until the handle is revoked.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Reference to bytes registered in a [`BlobStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    id: u64,
    mime_type: String,
}

impl BlobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Opaque URL the display layer can use as an image source
    pub fn url(&self) -> String {
        format!("blob:vision-insight/{}", self.id)
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    live: HashMap<u64, Bytes>,
}

/// Registry of live blob handles.
///
/// Every [`create`](Self::create) must be paired with a [`revoke`](Self::revoke);
/// [`live_count`](Self::live_count) exposes leaks. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    registry: Arc<Mutex<Registry>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register bytes and hand out a new handle
    pub fn create(&self, bytes: Bytes, mime_type: &str) -> BlobHandle {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        let size = bytes.len();
        registry.live.insert(id, bytes);

        tracing::debug!(
            "Created blob {} ({} bytes, {}), live={}",
            id,
            size,
            mime_type,
            registry.live.len()
        );

        BlobHandle {
            id,
            mime_type: mime_type.to_string(),
        }
    }

    /// Bytes behind a handle, or `None` once revoked
    pub fn resolve(&self, handle: &BlobHandle) -> Option<Bytes> {
        self.lock().live.get(&handle.id).cloned()
    }

    /// Release a handle. Returns `false` if it was already revoked.
    pub fn revoke(&self, handle: &BlobHandle) -> bool {
        let mut registry = self.lock();
        let removed = registry.live.remove(&handle.id).is_some();

        if removed {
            tracing::debug!("Revoked blob {}, live={}", handle.id, registry.live.len());
        } else {
            tracing::trace!("Blob {} already revoked", handle.id);
        }

        removed
    }

    pub fn is_live(&self, handle: &BlobHandle) -> bool {
        self.lock().live.contains_key(&handle.id)
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }
}

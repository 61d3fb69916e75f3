//! In-memory object store for tests and local development.
//!
//! Behaves like the remote service at the session boundary: digests are
//! verified on every upload, parts are keyed by index and assembled in
//! index order, and re-uploading an index replaces the slot. Call
//! counters are kept so tests can assert on the remote traffic an upload
//! produced.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::MAX_METADATA_PAIRS;
use crate::error::StoreError;
use crate::session::{MultipartSession, ObjectStore, PartLease, SimpleSession};
use crate::types::{RemoteObject, digest_hex};

/// Object payload plus the attributes stored with it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw object bytes.
    pub data: Vec<u8>,
    /// Content type stored with the object.
    pub content_type: String,
    /// Key/value pairs stored with the object.
    pub metadata: HashMap<String, String>,
}

/// In-memory [`ObjectStore`] backend.
///
/// Clones share the same storage, so a test can keep a handle while the
/// upload pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<String, StoredObject>,
    simple_uploads: u32,
    multipart_starts: u32,
    part_uploads: u32,
    finishes: u32,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored object named `name`, if any.
    pub fn object(&self, name: &str) -> Option<StoredObject> {
        self.inner.lock().unwrap().objects.get(name).cloned()
    }

    /// Number of one-shot uploads performed.
    pub fn simple_uploads(&self) -> u32 {
        self.inner.lock().unwrap().simple_uploads
    }

    /// Number of multipart sessions started.
    pub fn multipart_starts(&self) -> u32 {
        self.inner.lock().unwrap().multipart_starts
    }

    /// Number of part uploads accepted across all sessions.
    pub fn part_uploads(&self) -> u32 {
        self.inner.lock().unwrap().part_uploads
    }

    /// Number of multipart sessions finished.
    pub fn finishes(&self) -> u32 {
        self.inner.lock().unwrap().finishes
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument("empty object name".into()));
    }
    Ok(())
}

fn check_metadata(metadata: &HashMap<String, String>) -> Result<(), StoreError> {
    if metadata.len() > MAX_METADATA_PAIRS {
        return Err(StoreError::InvalidArgument(format!(
            "metadata holds {} pairs, limit is {MAX_METADATA_PAIRS}",
            metadata.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn simple_session(&self) -> Result<Box<dyn SimpleSession>, StoreError> {
        Ok(Box::new(MemorySimpleSession {
            store: self.clone(),
        }))
    }

    async fn start_multipart(
        &self,
        name: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Arc<dyn MultipartSession>, StoreError> {
        check_name(name)?;
        check_metadata(metadata)?;
        self.inner.lock().unwrap().multipart_starts += 1;
        Ok(Arc::new(MemoryMultipart {
            shared: Arc::new(MultipartShared {
                store: self.clone(),
                name: name.to_string(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                parts: Mutex::new(BTreeMap::new()),
                finished: AtomicBool::new(false),
            }),
        }))
    }
}

struct MemorySimpleSession {
    store: MemoryStore,
}

#[async_trait]
impl SimpleSession for MemorySimpleSession {
    async fn upload_whole(
        &self,
        payload: &[u8],
        name: &str,
        content_type: &str,
        digest: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<RemoteObject, StoreError> {
        check_name(name)?;
        check_metadata(metadata)?;
        if digest_hex(payload) != digest {
            return Err(StoreError::DigestMismatch(format!("object {name}")));
        }
        let mut inner = self.store.inner.lock().unwrap();
        inner.simple_uploads += 1;
        inner.objects.insert(
            name.to_string(),
            StoredObject {
                data: payload.to_vec(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(RemoteObject {
            name: name.to_string(),
            size: payload.len() as u64,
            content_type: content_type.to_string(),
            digest: Some(digest.to_string()),
        })
    }
}

struct MemoryMultipart {
    shared: Arc<MultipartShared>,
}

struct MultipartShared {
    store: MemoryStore,
    name: String,
    content_type: String,
    metadata: HashMap<String, String>,
    parts: Mutex<BTreeMap<u32, Vec<u8>>>,
    finished: AtomicBool,
}

#[async_trait]
impl MultipartSession for MemoryMultipart {
    async fn part_lease(&self) -> Result<Box<dyn PartLease>, StoreError> {
        if self.shared.finished.load(Ordering::SeqCst) {
            return Err(StoreError::SessionNotFound(self.shared.name.clone()));
        }
        Ok(Box::new(MemoryLease {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn finish(&self) -> Result<RemoteObject, StoreError> {
        if self.shared.finished.swap(true, Ordering::SeqCst) {
            return Err(StoreError::SessionNotFound(self.shared.name.clone()));
        }
        let parts = std::mem::take(&mut *self.shared.parts.lock().unwrap());
        let mut data = Vec::new();
        for part in parts.values() {
            data.extend_from_slice(part);
        }
        let size = data.len() as u64;
        let mut inner = self.shared.store.inner.lock().unwrap();
        inner.finishes += 1;
        inner.objects.insert(
            self.shared.name.clone(),
            StoredObject {
                data,
                content_type: self.shared.content_type.clone(),
                metadata: self.shared.metadata.clone(),
            },
        );
        Ok(RemoteObject {
            name: self.shared.name.clone(),
            size,
            content_type: self.shared.content_type.clone(),
            digest: None,
        })
    }
}

struct MemoryLease {
    shared: Arc<MultipartShared>,
}

#[async_trait]
impl PartLease for MemoryLease {
    async fn upload_part(
        &mut self,
        payload: &[u8],
        digest: &str,
        part_index: u32,
    ) -> Result<usize, StoreError> {
        if part_index == 0 {
            return Err(StoreError::InvalidArgument("part indexes are 1-based".into()));
        }
        if self.shared.finished.load(Ordering::SeqCst) {
            return Err(StoreError::SessionNotFound(self.shared.name.clone()));
        }
        if digest_hex(payload) != digest {
            return Err(StoreError::DigestMismatch(format!("part {part_index}")));
        }
        self.shared
            .parts
            .lock()
            .unwrap()
            .insert(part_index, payload.to_vec());
        self.shared.store.inner.lock().unwrap().part_uploads += 1;
        Ok(payload.len())
    }
}

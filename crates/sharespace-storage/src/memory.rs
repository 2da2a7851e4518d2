//! In-memory object store.
//!
//! Used by tests and single-process development runs. Besides the
//! [`ObjectStore`] contract it can simulate a shared global namespace: names
//! registered with [`InMemoryObjectStore::reserve_foreign_name`] behave like
//! buckets owned by another account.

use crate::signing::UrlSigner;
use crate::traits::{
    validate_container_name, validate_key, ContainerInfo, ObjectInfo, ObjectStore, StorageError,
    StorageResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const MEMORY_URL_BASE: &str = "memory://objects";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
    etag: String,
}

impl StoredObject {
    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

#[derive(Debug)]
struct Container {
    created_at: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, Container>,
    foreign_names: HashSet<String>,
    reject_creates: u32,
    fail_copies: u32,
    create_attempts: Vec<String>,
    last_timestamp: Option<DateTime<Utc>>,
    writes: u64,
}

impl State {
    /// Strictly increasing timestamps so "oldest" is well defined within a test.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    /// Every write gets its own entity tag, even when the bytes repeat.
    fn next_etag(&mut self) -> String {
        self.writes += 1;
        format!("\"{:016x}\"", self.writes)
    }

    fn container(&self, name: &str) -> StorageResult<&Container> {
        self.containers
            .get(name)
            .ok_or_else(|| StorageError::ContainerNotFound(name.to_string()))
    }

    fn container_mut(&mut self, name: &str) -> StorageResult<&mut Container> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| StorageError::ContainerNotFound(name.to_string()))
    }
}

pub struct InMemoryObjectStore {
    state: Mutex<State>,
    signer: UrlSigner,
}

impl InMemoryObjectStore {
    pub fn new(url_signing_secret: impl AsRef<[u8]>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            signer: UrlSigner::new(url_signing_secret, MEMORY_URL_BASE),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-operation; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a name as held by another account in the global namespace.
    pub fn reserve_foreign_name(&self, name: impl Into<String>) {
        self.lock().foreign_names.insert(name.into());
    }

    /// Make the next `n` container creations fail with `ContainerNameTaken`,
    /// whatever name they use.
    pub fn reject_next_creates(&self, n: u32) {
        self.lock().reject_creates = n;
    }

    /// Make the next `n` copies fail with a transient backend error.
    pub fn fail_next_copies(&self, n: u32) {
        self.lock().fail_copies = n;
    }

    /// Every name passed to `create_container`, in call order.
    pub fn create_attempts(&self) -> Vec<String> {
        self.lock().create_attempts.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn object_keys(&self, container: &str) -> Vec<String> {
        self.lock()
            .containers
            .get(container)
            .map(|c| c.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Shift an object's modification time into the past.
    pub fn backdate_object(&self, container: &str, key: &str, age: Duration) -> StorageResult<()> {
        let mut state = self.lock();
        let object = state
            .container_mut(container)?
            .objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let age = ChronoDuration::from_std(age)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        object.last_modified -= age;
        Ok(())
    }

    /// Resolve a URL from [`ObjectStore::presigned_get_url`] the way an HTTP
    /// client would: the signature and expiry are checked before the read.
    pub fn fetch(&self, url: &str) -> StorageResult<Bytes> {
        let (container, key) = self.signer.verify(url)?;
        let data = self
            .lock()
            .container(&container)?
            .objects
            .get(&key)
            .map(|o| o.data.clone());
        data.ok_or(StorageError::NotFound(key))
    }

    pub fn content_type(&self, container: &str, key: &str) -> Option<String> {
        self.lock()
            .containers
            .get(container)
            .and_then(|c| c.objects.get(key))
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        Ok(self
            .lock()
            .containers
            .iter()
            .map(|(name, c)| ContainerInfo {
                name: name.clone(),
                created_at: Some(c.created_at),
            })
            .collect())
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        let mut state = self.lock();
        state.create_attempts.push(name.to_string());
        validate_container_name(name)?;

        if state.reject_creates > 0 {
            state.reject_creates -= 1;
            return Err(StorageError::ContainerNameTaken(name.to_string()));
        }
        if state.foreign_names.contains(name) {
            return Err(StorageError::ContainerNameTaken(name.to_string()));
        }
        if state.containers.contains_key(name) {
            return Ok(());
        }

        let created_at = state.next_timestamp();
        state.containers.insert(
            name.to_string(),
            Container {
                created_at,
                objects: BTreeMap::new(),
            },
        );
        tracing::debug!(container = %name, "In-memory container created");
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        let mut state = self.lock();
        if !state.container(name)?.objects.is_empty() {
            return Err(StorageError::ContainerNotEmpty(name.to_string()));
        }
        state.containers.remove(name);
        Ok(())
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let mut state = self.lock();
        let last_modified = state.next_timestamp();
        let etag = state.next_etag();
        state.container_mut(container)?.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified,
                etag,
            },
        );
        Ok(())
    }

    async fn get(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        self.lock()
            .container(container)?
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> StorageResult<()> {
        validate_key(to_key)?;
        let mut state = self.lock();
        if state.fail_copies > 0 {
            state.fail_copies -= 1;
            return Err(StorageError::BackendError(
                "simulated transient copy failure".to_string(),
            ));
        }

        let mut object = state
            .container(from_container)?
            .objects
            .get(from_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        object.last_modified = state.next_timestamp();
        object.etag = state.next_etag();
        state
            .container_mut(to_container)?
            .objects
            .insert(to_key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        self.lock().container_mut(container)?.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        Ok(self.lock().container(container)?.objects.contains_key(key))
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        Ok(self
            .lock()
            .container(container)?
            .objects
            .get(key)
            .map(|o| o.info(key)))
    }

    async fn list_objects(&self, container: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(self
            .lock()
            .container(container)?
            .objects
            .iter()
            .map(|(key, o)| o.info(key))
            .collect())
    }

    async fn presigned_get_url(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signer.sign(container, key, expires_in))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[tokio::test]
    async fn foreign_names_report_taken_and_own_names_succeed() {
        let store = InMemoryObjectStore::new(SECRET);
        store.reserve_foreign_name("tenant-id-7-11111");

        assert!(matches!(
            store.create_container("tenant-id-7-11111").await,
            Err(StorageError::ContainerNameTaken(_))
        ));
        store.create_container("tenant-id-7-22222").await.unwrap();
        store.create_container("tenant-id-7-22222").await.unwrap();
        assert_eq!(store.container_names(), vec!["tenant-id-7-22222"]);
        assert_eq!(store.create_attempts().len(), 3);
    }

    #[tokio::test]
    async fn rejected_creates_are_counted_down() {
        let store = InMemoryObjectStore::new(SECRET);
        store.reject_next_creates(2);
        assert!(store.create_container("aaa-1").await.is_err());
        assert!(store.create_container("aaa-2").await.is_err());
        assert!(store.create_container("aaa-3").await.is_ok());
    }

    #[tokio::test]
    async fn delete_container_requires_empty() {
        let store = InMemoryObjectStore::new(SECRET);
        store.create_container("box-1").await.unwrap();
        store
            .put("box-1", "1.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        assert!(matches!(
            store.delete_container("box-1").await,
            Err(StorageError::ContainerNotEmpty(_))
        ));
        store.delete("box-1", "1.jpg").await.unwrap();
        store.delete("box-1", "1.jpg").await.unwrap();
        store.delete_container("box-1").await.unwrap();
        assert!(store.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_of_missing_source_is_not_found() {
        let store = InMemoryObjectStore::new(SECRET);
        store.create_container("src-1").await.unwrap();
        store.create_container("dst-1").await.unwrap();
        let err = store.copy("src-1", "7-42.jpg", "dst-1", "42.jpg").await;
        assert!(matches!(err, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn presigned_url_fetches_object_bytes() {
        let store = InMemoryObjectStore::new(SECRET);
        store.create_container("media-1").await.unwrap();
        store
            .put("media-1", "42.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        let url = store
            .presigned_get_url("media-1", "42.jpg", Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(store.fetch(&url).unwrap(), Bytes::from_static(b"jpeg"));
        assert!(store.fetch(&url.replace("signature=", "signature=A")).is_err());
    }

    #[tokio::test]
    async fn head_tells_rewrites_apart() {
        let store = InMemoryObjectStore::new(SECRET);
        store.create_container("box-1").await.unwrap();
        assert_eq!(store.head("box-1", "1.jpg").await.unwrap(), None);

        store
            .put("box-1", "1.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        let first = store.head("box-1", "1.jpg").await.unwrap().unwrap();
        assert_eq!(first.size, 1);
        assert!(first.same_version(&store.head("box-1", "1.jpg").await.unwrap().unwrap()));

        store
            .put("box-1", "1.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        let second = store.head("box-1", "1.jpg").await.unwrap().unwrap();
        assert!(!first.same_version(&second));
        assert_eq!(store.list_objects("box-1").await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn containers_report_increasing_creation_times() {
        let store = InMemoryObjectStore::new(SECRET);
        store.create_container("bbb-1").await.unwrap();
        store.create_container("aaa-1").await.unwrap();
        let listed = store.list_containers().await.unwrap();
        let b = listed.iter().find(|c| c.name == "bbb-1").unwrap();
        let a = listed.iter().find(|c| c.name == "aaa-1").unwrap();
        assert!(b.created_at < a.created_at);
    }
}

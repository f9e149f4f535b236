//! In-process object store
//!
//! Keeps containers and objects in memory, behaving like Swift where it
//! matters to the sharded driver: a PUT into a missing container fails
//! with [`ObjectApiError::ContainerNotFound`], ETags are verified, and ACLs
//! can be read back. Used by the `memory` backend and the tests.

use crate::error::ObjectApiError;
use crate::object_api::{ObjectApi, ObjectBody, ObjectInfo, ObjectStream};
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Default)]
struct Container {
    read_acl: Option<String>,
    objects: HashMap<String, StoredObject>,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
}

/// Call counters, for asserting on backend traffic.
#[derive(Debug, Default)]
pub struct CallStats {
    pub puts: AtomicUsize,
    pub heads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub container_creates: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl CallStats {
    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

struct InFlight<'a>(&'a CallStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Object store held in memory.
#[derive(Default)]
pub struct MemoryObjectApi {
    containers: RwLock<HashMap<String, Container>>,
    stats: Arc<CallStats>,
    /// Artificial latency per object call
    latency: Option<Duration>,
    /// Containers that accept creation but report a different ACL
    acl_override: RwLock<HashMap<String, String>>,
}

impl MemoryObjectApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every object call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }

    /// Make `container` report `acl` regardless of what was requested.
    pub async fn force_acl(&self, container: &str, acl: &str) {
        self.acl_override
            .write()
            .await
            .insert(container.to_string(), acl.to_string());
    }

    pub async fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn object_count(&self) -> usize {
        self.containers
            .read()
            .await
            .values()
            .map(|c| c.objects.len())
            .sum()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectApi for MemoryObjectApi {
    async fn create_container(&self, container: &str, read_acl: &str) -> Result<(), ObjectApiError> {
        self.stats.container_creates.fetch_add(1, Ordering::SeqCst);
        let acl = match self.acl_override.read().await.get(container) {
            Some(forced) => forced.clone(),
            None => read_acl.to_string(),
        };

        let mut containers = self.containers.write().await;
        containers.entry(container.to_string()).or_default().read_acl = Some(acl);
        Ok(())
    }

    async fn container_read_acl(&self, container: &str) -> Result<Option<String>, ObjectApiError> {
        self.containers
            .read()
            .await
            .get(container)
            .map(|c| c.read_acl.clone())
            .ok_or(ObjectApiError::ContainerNotFound)
    }

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        mut body: ObjectBody,
        etag: Option<&str>,
    ) -> Result<ObjectInfo, ObjectApiError> {
        let _guard = self.stats.enter();
        self.stats.puts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if !self.containers.read().await.contains_key(container) {
            return Err(ObjectApiError::ContainerNotFound);
        }

        let mut data = Vec::with_capacity(body.len as usize);
        body.reader.read_to_end(&mut data).await?;

        let actual = hex::encode(Md5::digest(&data));
        if let Some(expected) = etag {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(ObjectApiError::ChecksumMismatch);
            }
        }

        let info = ObjectInfo {
            size: data.len() as u64,
            etag: actual.clone(),
        };

        let mut containers = self.containers.write().await;
        let target = containers
            .get_mut(container)
            .ok_or(ObjectApiError::ContainerNotFound)?;
        target.objects.insert(
            name.to_string(),
            StoredObject {
                data: Bytes::from(data),
                etag: actual,
            },
        );
        Ok(info)
    }

    async fn get_object(&self, container: &str, name: &str) -> Result<ObjectStream, ObjectApiError> {
        let _guard = self.stats.enter();
        self.pause().await;

        let containers = self.containers.read().await;
        let object = containers
            .get(container)
            .ok_or(ObjectApiError::ContainerNotFound)?
            .objects
            .get(name)
            .ok_or(ObjectApiError::ObjectNotFound)?;

        Ok(ObjectStream {
            size: object.data.len() as u64,
            etag: object.etag.clone(),
            reader: Box::new(Cursor::new(object.data.clone())),
        })
    }

    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, ObjectApiError> {
        let _guard = self.stats.enter();
        self.stats.heads.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let containers = self.containers.read().await;
        let object = containers
            .get(container)
            .ok_or(ObjectApiError::ContainerNotFound)?
            .objects
            .get(name)
            .ok_or(ObjectApiError::ObjectNotFound)?;

        Ok(ObjectInfo {
            size: object.data.len() as u64,
            etag: object.etag.clone(),
        })
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), ObjectApiError> {
        let _guard = self.stats.enter();
        self.stats.deletes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let mut containers = self.containers.write().await;
        containers
            .get_mut(container)
            .ok_or(ObjectApiError::ContainerNotFound)?
            .objects
            .remove(name)
            .map(|_| ())
            .ok_or(ObjectApiError::ObjectNotFound)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

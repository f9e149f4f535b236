//! Remote object-store API
//!
//! The operations the sharded driver needs from an object store that groups
//! objects into containers (OpenStack Swift and friends). Implementations
//! live in [`crate::swift`] and [`crate::memory`].

use crate::blob_ref::BlobReader;
use crate::error::ObjectApiError;
use async_trait::async_trait;

/// Header-level metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    /// Hex MD5 as reported by the store, empty if unknown.
    pub etag: String,
}

/// Body of an object upload.
pub struct ObjectBody {
    pub reader: BlobReader,
    pub len: u64,
}

/// Open object stream.
pub struct ObjectStream {
    pub reader: BlobReader,
    pub size: u64,
    /// Hex MD5 reported by the store, empty if it sent none.
    pub etag: String,
}

#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Create (or update) a container with the given read ACL.
    async fn create_container(&self, container: &str, read_acl: &str) -> Result<(), ObjectApiError>;

    /// Read back a container's read ACL. `None` if the header is missing.
    async fn container_read_acl(&self, container: &str) -> Result<Option<String>, ObjectApiError>;

    /// Store an object. When `etag` is set, the store rejects the upload if
    /// the MD5 of the received bytes differs.
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        body: ObjectBody,
        etag: Option<&str>,
    ) -> Result<ObjectInfo, ObjectApiError>;

    async fn get_object(&self, container: &str, name: &str) -> Result<ObjectStream, ObjectApiError>;

    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, ObjectApiError>;

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), ObjectApiError>;

    /// Short identifier for logs.
    fn describe(&self) -> String;
}

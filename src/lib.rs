//! Blobserver - HTTP blob storage over a sharded object store
//!
//! Accepts multipart uploads, stat and remove requests over HTTP and keeps
//! the bytes in an OpenStack Swift account (or in memory).
//!
//! ## Architecture
//!
//! ```text
//! HTTP (hyper) ──▶ BlobStorage ──▶ ShardedStorage ──▶ ObjectApi
//!                    (trait)        spool, gates        ├─ SwiftClient
//!                                   container shards    └─ MemoryObjectApi
//! ```
//!
//! - Uploads are spooled (memory, then a temp file past a threshold) so the
//!   MD5 is known before the object PUT and can be verified by the store.
//! - Unqualified refs are spread over 1024 containers by a hash of the name;
//!   `container/name` refs go where they say.
//! - Stat and remove fan out concurrently behind a bounded gate.
//!
//! ## Features
//!
//! - `swift` (default) - OpenStack Swift backend via reqwest

pub mod blob_ref;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod memory;
pub mod object_api;
pub mod response;
pub mod sharded;
pub mod spool;
pub mod storage;
#[cfg(feature = "swift")]
pub mod swift;

// Re-exports
pub use blob_ref::{BlobReader, Ref, SizedInfoRef, SizedRef};
pub use config::Config;
pub use error::{ObjectApiError, StorageError};
pub use http::HttpServer;
pub use memory::MemoryObjectApi;
pub use object_api::ObjectApi;
pub use sharded::{ShardedSettings, ShardedStorage};
pub use spool::Spool;
pub use storage::{BlobStorage, FetchedBlob, StorageConfig, StorageRegistry};

//! Storage contract and backend registry
//!
//! [`BlobStorage`] is everything the HTTP layer knows about a backend.
//! Backends are built by name through a [`StorageRegistry`] that `main`
//! constructs and passes along, so nothing depends on registration order.

use crate::blob_ref::{BlobReader, Ref, SizedInfoRef};
use crate::config::Config;
use crate::error::StorageError;
use crate::memory::MemoryObjectApi;
use crate::sharded::{ShardedSettings, ShardedStorage};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Public facts a backend advertises on the config endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "CDNUrl")]
    pub cdn_url: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// An open blob.
pub struct FetchedBlob {
    pub reader: BlobReader,
    pub size: u64,
    pub etag: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store the bytes of `source` under `blob_ref`. The caller caps
    /// `source` at the maximum blob size plus one byte.
    async fn receive_blob(&self, blob_ref: Ref, source: BlobReader) -> Result<SizedInfoRef, StorageError>;

    /// Send a [`SizedInfoRef`] to `dest` for every ref that exists. Missing
    /// refs are skipped. `dest` belongs to the caller and is never closed.
    async fn stat_blobs(
        &self,
        dest: &mpsc::Sender<SizedInfoRef>,
        refs: &[Ref],
    ) -> Result<(), StorageError>;

    /// Remove blobs. Removing a ref that does not exist is not an error.
    async fn remove_blobs(&self, refs: &[Ref]) -> Result<(), StorageError>;

    /// Open a blob for reading; [`StorageError::NotFound`] if it is absent.
    async fn fetch(&self, blob_ref: &Ref) -> Result<FetchedBlob, StorageError>;

    /// Config endpoint payload, `None` if the backend has nothing to say.
    fn config(&self) -> Option<StorageConfig> {
        None
    }
}

/// Stat one blob, turning absence into [`StorageError::NotFound`].
pub async fn stat_blob(storage: &dyn BlobStorage, blob_ref: &Ref) -> Result<SizedInfoRef, StorageError> {
    let (tx, mut rx) = mpsc::channel(1);
    storage.stat_blobs(&tx, std::slice::from_ref(blob_ref)).await?;
    drop(tx);
    rx.recv()
        .await
        .ok_or_else(|| StorageError::NotFound(blob_ref.to_string()))
}

/// Pending backend construction.
pub type StorageFuture = BoxFuture<'static, Result<Arc<dyn BlobStorage>, StorageError>>;

/// Builds a backend from the server configuration.
pub type StorageConstructor = Arc<dyn Fn(Config) -> StorageFuture + Send + Sync>;

/// Backend constructors by name.
#[derive(Default)]
pub struct StorageRegistry {
    constructors: HashMap<String, StorageConstructor>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend compiled into this binary.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.constructors.insert(
            "memory".to_string(),
            Arc::new(|config: Config| -> StorageFuture {
                Box::pin(async move {
                    let settings = ShardedSettings::from_memory_config(&config);
                    let storage = ShardedStorage::new(Arc::new(MemoryObjectApi::new()), settings);
                    Ok(Arc::new(storage) as Arc<dyn BlobStorage>)
                })
            }),
        );

        #[cfg(feature = "swift")]
        registry.constructors.insert(
            "swift".to_string(),
            Arc::new(|config: Config| -> StorageFuture {
                Box::pin(async move {
                    let swift = config
                        .swift
                        .clone()
                        .ok_or_else(|| StorageError::Config("missing [swift] section".into()))?;
                    let client = crate::swift::SwiftClient::authenticate(&swift).await?;
                    let settings = ShardedSettings::from_swift_config(&config, &swift);
                    let storage = ShardedStorage::new(Arc::new(client), settings);
                    if config.init_containers {
                        storage.init_containers().await?;
                    }
                    Ok(Arc::new(storage) as Arc<dyn BlobStorage>)
                })
            }),
        );

        registry
    }

    /// Register a constructor. A name can only be taken once.
    pub fn register(&mut self, name: &str, constructor: StorageConstructor) -> Result<(), StorageError> {
        if self.constructors.contains_key(name) {
            return Err(StorageError::Config(format!(
                "storage constructor already registered for type: {}",
                name
            )));
        }
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend named by `config.storage`.
    pub async fn create(&self, config: &Config) -> Result<Arc<dyn BlobStorage>, StorageError> {
        let constructor = self.constructors.get(&config.storage).ok_or_else(|| {
            StorageError::Config(format!("storage type {} not known or loaded", config.storage))
        })?;

        info!(storage = %config.storage, "Creating storage backend");
        constructor(config.clone()).await
    }
}

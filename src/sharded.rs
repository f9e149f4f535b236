//! Sharded object-store backend
//!
//! Spreads blobs over a fixed set of containers so no single container hits
//! the store's per-container object or throughput ceilings.
//!
//! ## Container assignment
//!
//! ```text
//! ref "5f0c...e1.jpg"  ──md5──▶ first 4 bytes (big-endian u32) % 1024 ──▶ "3a7"
//!                                                       container = "{base}-3a7"
//! ref "avatars/me.png" ──────────────────────────────────────────▶ "avatars"
//! ```
//!
//! Assignment is a pure function of the ref; nothing is stored to remember
//! it. Containers are created lazily: reads never pre-check, and a write
//! that hits a missing container creates it, verifies its read ACL and
//! retries once.

use crate::blob_ref::{BlobReader, Ref, SizedInfoRef};
use crate::config::{Config, SwiftConfig, DEFAULT_CONTAINER_READ_ACL, DEFAULT_MAX_BLOB_SIZE};
use crate::error::StorageError;
use crate::gate::{ErrGroup, Gate, DEFAULT_GATE_LIMIT};
use crate::object_api::{ObjectApi, ObjectBody};
use crate::spool::{Spool, DEFAULT_MAX_IN_MEMORY};
use crate::storage::{BlobStorage, FetchedBlob, StorageConfig};
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Number of shard containers
pub const SHARD_COUNT: usize = 1024;

/// Attempts per container during bulk initialization
pub const CONTAINER_CREATE_ATTEMPTS: usize = 3;

/// Read size when copying an upload into the spool
const COPY_CHUNK: usize = 64 * 1024;

/// Fixed table of shard labels, `00` through `3ff`.
#[derive(Clone)]
pub struct Sharder {
    labels: Arc<Vec<String>>,
}

impl Sharder {
    pub fn new() -> Self {
        Self {
            labels: Arc::new((0..SHARD_COUNT).map(|i| format!("{:02x}", i)).collect()),
        }
    }

    /// Index into the label table for `key`.
    pub fn index(&self, key: &str) -> usize {
        let digest = Md5::digest(key.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        prefix as usize % self.labels.len()
    }

    pub fn shard(&self, key: &str) -> &str {
        &self.labels[self.index(key)]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for Sharder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for a [`ShardedStorage`].
#[derive(Debug, Clone)]
pub struct ShardedSettings {
    /// Advertised backend name
    pub name: String,
    /// Base container name
    pub container: String,
    /// Spread unqualified refs over `{container}-{shard}`
    pub shard: bool,
    pub container_read_acl: String,
    pub cdn_url: String,
    pub max_blob_size: u64,
    pub max_in_memory: usize,
    pub spool_dir: Option<PathBuf>,
    pub gate_limit: usize,
}

impl Default for ShardedSettings {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            container: "blobs".to_string(),
            shard: true,
            container_read_acl: DEFAULT_CONTAINER_READ_ACL.to_string(),
            cdn_url: String::new(),
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            max_in_memory: DEFAULT_MAX_IN_MEMORY,
            spool_dir: None,
            gate_limit: DEFAULT_GATE_LIMIT,
        }
    }
}

impl ShardedSettings {
    pub fn from_memory_config(config: &Config) -> Self {
        Self {
            name: "memory".to_string(),
            container: config.memory.container.clone(),
            shard: config.memory.shard,
            container_read_acl: DEFAULT_CONTAINER_READ_ACL.to_string(),
            cdn_url: config.memory.cdn_url.clone(),
            max_blob_size: config.max_blob_size,
            max_in_memory: config.max_in_memory,
            spool_dir: config.spool_dir.clone(),
            gate_limit: config.backend_concurrency,
        }
    }

    pub fn from_swift_config(config: &Config, swift: &SwiftConfig) -> Self {
        Self {
            name: "swift".to_string(),
            container: swift.container.clone(),
            shard: swift.shard,
            container_read_acl: swift.container_read_acl.clone(),
            cdn_url: swift.cdn_url.clone(),
            max_blob_size: config.max_blob_size,
            max_in_memory: config.max_in_memory,
            spool_dir: config.spool_dir.clone(),
            gate_limit: config.backend_concurrency,
        }
    }
}

/// [`BlobStorage`] over a container-organized object store.
pub struct ShardedStorage {
    api: Arc<dyn ObjectApi>,
    settings: ShardedSettings,
    sharder: Sharder,
    stat_gate: Gate,
    remove_gate: Gate,
}

impl ShardedStorage {
    pub fn new(api: Arc<dyn ObjectApi>, settings: ShardedSettings) -> Self {
        info!(
            api = %api.describe(),
            container = %settings.container,
            shard = settings.shard,
            "Initialized sharded storage"
        );

        Self {
            stat_gate: Gate::new(settings.gate_limit),
            remove_gate: Gate::new(settings.gate_limit),
            sharder: Sharder::new(),
            api,
            settings,
        }
    }

    /// Container an unqualified ref is assigned to.
    pub fn container_for(&self, blob_ref: &Ref) -> String {
        if let Some(container) = blob_ref.container() {
            return container.to_string();
        }
        if !self.settings.shard {
            return self.settings.container.clone();
        }
        format!(
            "{}-{}",
            self.settings.container,
            self.sharder.shard(blob_ref.name())
        )
    }

    /// Split a ref into (container, object name).
    pub fn locate(&self, blob_ref: &Ref) -> (String, String) {
        (self.container_for(blob_ref), blob_ref.name().to_string())
    }

    pub fn stat_gate(&self) -> &Gate {
        &self.stat_gate
    }

    /// Create a container and check that the read ACL stuck.
    async fn create_checked_container(&self, container: &str) -> Result<(), StorageError> {
        create_checked_container(self.api.as_ref(), container, &self.settings.container_read_acl).await
    }

    /// Create and verify every shard container. Each container gets up to
    /// [`CONTAINER_CREATE_ATTEMPTS`] tries.
    pub async fn init_containers(&self) -> Result<(), StorageError> {
        if !self.settings.shard {
            return Ok(());
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            << 3;
        let gate = Gate::new(workers);
        let mut group = ErrGroup::new();

        info!(
            containers = self.sharder.labels().len(),
            workers,
            "Checking shard containers"
        );

        for label in self.sharder.labels() {
            let permit = gate.acquire().await?;
            let api = Arc::clone(&self.api);
            let acl = self.settings.container_read_acl.clone();
            let container = format!("{}-{}", self.settings.container, label);

            group.spawn(async move {
                let _permit = permit;
                let mut last_err = None;
                for attempt in 1..=CONTAINER_CREATE_ATTEMPTS {
                    match create_checked_container(api.as_ref(), &container, &acl).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            warn!(container = %container, attempt, error = %e, "Create container failed");
                            last_err = Some(e);
                        }
                    }
                }
                Err(last_err.unwrap_or_else(|| StorageError::Internal("no create attempt made".into())))
            });
        }

        group.wait().await
    }

    async fn spool_source(&self, blob_ref: &Ref, source: BlobReader) -> Result<Spool, StorageError> {
        let mut spool = Spool::new(blob_ref, self.settings.max_in_memory);
        if let Some(dir) = &self.settings.spool_dir {
            spool = spool.in_dir(dir);
        }

        if let Err(err) = self.fill_spool(&mut spool, source).await {
            if let Err(e) = spool.cleanup().await {
                warn!(blob_ref = %blob_ref, error = %e, "Failed to remove spool file");
            }
            return Err(err);
        }

        Ok(spool)
    }

    async fn fill_spool(&self, spool: &mut Spool, source: BlobReader) -> Result<(), StorageError> {
        // one byte past the cap tells an oversize blob apart from an exact fit
        let mut limited = source.take(self.settings.max_blob_size + 1);
        let mut chunk = vec![0u8; COPY_CHUNK];
        loop {
            let n = match limited.read(&mut chunk).await {
                Ok(n) => n,
                // the client's bytes were malformed, not our storage
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Err(StorageError::InvalidInput(e.to_string()))
                }
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Ok(());
            }
            spool.write(&chunk[..n]).await?;
            if spool.len() > self.settings.max_blob_size {
                return Err(StorageError::TooLarge {
                    limit: self.settings.max_blob_size,
                });
            }
        }
    }

    async fn put_spooled(
        &self,
        container: &str,
        name: &str,
        spool: &mut Spool,
        digest: &str,
    ) -> Result<(), StorageError> {
        let body = ObjectBody {
            reader: spool.open().await?,
            len: spool.len(),
        };

        match self.api.put_object(container, name, body, Some(digest)).await {
            Ok(_) => Ok(()),
            // Swift reports a missing container as either of these on PUT
            Err(e) if e.is_not_found() => {
                debug!(container = %container, "Container missing, creating");
                self.create_checked_container(container).await?;

                let body = ObjectBody {
                    reader: spool.open().await?,
                    len: spool.len(),
                };
                self.api
                    .put_object(container, name, body, Some(digest))
                    .await
                    .map(|_| ())
                    .map_err(StorageError::from)
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn create_checked_container(
    api: &dyn ObjectApi,
    container: &str,
    read_acl: &str,
) -> Result<(), StorageError> {
    api.create_container(container, read_acl).await?;

    let actual = api.container_read_acl(container).await?;
    if actual.as_deref() != Some(read_acl) {
        return Err(StorageError::AclMismatch {
            container: container.to_string(),
            expected: read_acl.to_string(),
            actual,
        });
    }

    info!(container = %container, acl = %read_acl, "Created container");
    Ok(())
}

#[async_trait]
impl BlobStorage for ShardedStorage {
    async fn receive_blob(&self, blob_ref: Ref, source: BlobReader) -> Result<SizedInfoRef, StorageError> {
        let mut spool = self.spool_source(&blob_ref, source).await?;
        let digest = spool.digest_hex();
        let size = spool.len();
        let (container, name) = self.locate(&blob_ref);

        let result = self.put_spooled(&container, &name, &mut spool, &digest).await;

        if let Err(e) = spool.cleanup().await {
            warn!(blob_ref = %blob_ref, error = %e, "Failed to remove spool file");
        }
        result?;

        let stored = Ref::with_container(container, name);
        info!(blob_ref = %stored, size, md5 = %digest, "Received blob");
        Ok(SizedInfoRef::new(stored, size, digest))
    }

    async fn stat_blobs(
        &self,
        dest: &mpsc::Sender<SizedInfoRef>,
        refs: &[Ref],
    ) -> Result<(), StorageError> {
        let mut group = ErrGroup::new();

        for blob_ref in refs {
            let permit = self.stat_gate.acquire().await?;
            let api = Arc::clone(&self.api);
            let dest = dest.clone();
            let (container, name) = self.locate(blob_ref);
            let requested = blob_ref.clone();

            group.spawn(async move {
                let _permit = permit;
                debug!(container = %container, name = %name, "Stat");

                match api.head_object(&container, &name).await {
                    Ok(info) => {
                        let found = SizedInfoRef::new(Ref::with_container(container, name), info.size, info.etag);
                        dest.send(found)
                            .await
                            .map_err(|_| StorageError::Internal("stat receiver dropped".into()))
                    }
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => {
                        error!(blob_ref = %requested, error = %e, "Stat failed");
                        Err(StorageError::Backend(e))
                    }
                }
            });
        }

        group.wait().await
    }

    async fn remove_blobs(&self, refs: &[Ref]) -> Result<(), StorageError> {
        let mut group = ErrGroup::new();

        for blob_ref in refs {
            let permit = self.remove_gate.acquire().await?;
            let api = Arc::clone(&self.api);
            let (container, name) = self.locate(blob_ref);

            group.spawn(async move {
                let _permit = permit;
                info!(container = %container, name = %name, "Remove");

                match api.delete_object(&container, &name).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(StorageError::Backend(e)),
                }
            });
        }

        group.wait().await
    }

    async fn fetch(&self, blob_ref: &Ref) -> Result<FetchedBlob, StorageError> {
        let (container, name) = self.locate(blob_ref);

        match self.api.get_object(&container, &name).await {
            Ok(stream) => Ok(FetchedBlob {
                reader: stream.reader,
                size: stream.size,
                etag: stream.etag,
            }),
            Err(e) if e.is_not_found() => Err(StorageError::NotFound(blob_ref.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn config(&self) -> Option<StorageConfig> {
        Some(StorageConfig {
            cdn_url: self.settings.cdn_url.clone(),
            name: self.settings.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectApi;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::atomic::Ordering;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncRead, ReadBuf};

    fn reader(data: &[u8]) -> BlobReader {
        Box::new(Cursor::new(data.to_vec()))
    }

    /// Yields `head`, then runs `between` once, then yields `tail`.
    struct SplitReader<F> {
        head: Cursor<Vec<u8>>,
        between: Option<F>,
        tail: Cursor<Vec<u8>>,
    }

    impl<F: FnOnce() -> io::Result<()> + Unpin> AsyncRead for SplitReader<F> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = &mut *self;
            if (this.head.position() as usize) < this.head.get_ref().len() {
                return Pin::new(&mut this.head).poll_read(cx, buf);
            }
            if let Some(between) = this.between.take() {
                if let Err(e) = between() {
                    return Poll::Ready(Err(e));
                }
            }
            Pin::new(&mut this.tail).poll_read(cx, buf)
        }
    }

    fn split_reader<F>(head: &[u8], between: F, tail: &[u8]) -> BlobReader
    where
        F: FnOnce() -> io::Result<()> + Send + Unpin + 'static,
    {
        Box::new(SplitReader {
            head: Cursor::new(head.to_vec()),
            between: Some(between),
            tail: Cursor::new(tail.to_vec()),
        })
    }

    fn storage_over(api: Arc<MemoryObjectApi>, settings: ShardedSettings) -> ShardedStorage {
        ShardedStorage::new(api, settings)
    }

    #[test]
    fn test_shard_labels() {
        let sharder = Sharder::new();
        assert_eq!(sharder.labels().len(), SHARD_COUNT);
        assert_eq!(sharder.labels()[0], "00");
        assert_eq!(sharder.labels()[0x3a], "3a");
        assert_eq!(sharder.labels()[SHARD_COUNT - 1], "3ff");
    }

    #[test]
    fn test_shard_is_deterministic() {
        let sharder = Sharder::new();
        // md5("\x00") starts with 93b885ad; 0x93b885ad % 1024 == 0xad
        assert_eq!(sharder.shard("\x00"), "ad");
        for i in 0..100 {
            let key = format!("{}.bin", i);
            assert_eq!(sharder.shard(&key), Sharder::new().shard(&key));
        }
    }

    #[test]
    fn test_container_assignment() {
        let storage = storage_over(Arc::new(MemoryObjectApi::new()), ShardedSettings::default());
        let r = Ref::parse("photo.jpg").unwrap();
        let container = storage.container_for(&r);
        assert!(container.starts_with("blobs-"));
        assert_eq!(container, storage.container_for(&r));

        let qualified = Ref::parse("avatars/me.png").unwrap();
        assert_eq!(storage.container_for(&qualified), "avatars");

        let flat = storage_over(
            Arc::new(MemoryObjectApi::new()),
            ShardedSettings {
                shard: false,
                ..ShardedSettings::default()
            },
        );
        assert_eq!(flat.container_for(&r), "blobs");
    }

    #[tokio::test]
    async fn test_receive_creates_container_and_fetches_back() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(api.clone(), ShardedSettings::default());

        let r = Ref::generate("hello.txt");
        let got = storage.receive_blob(r.clone(), reader(b"hello")).await.unwrap();

        assert_eq!(got.size(), 5);
        assert_eq!(got.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(got.blob_ref().name(), r.name());
        assert_eq!(got.blob_ref().container(), Some(storage.container_for(&r).as_str()));

        let stats = api.stats();
        // failed put, container create, retried put
        assert_eq!(stats.puts.load(Ordering::SeqCst), 2);
        assert_eq!(stats.container_creates.load(Ordering::SeqCst), 1);

        let mut fetched = storage.fetch(got.blob_ref()).await.unwrap();
        let mut data = Vec::new();
        fetched.reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(fetched.size, 5);
        assert_eq!(data, b"hello");

        // the unqualified ref resolves to the same place
        let mut again = storage.fetch(&r).await.unwrap();
        let mut data = Vec::new();
        again.reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_second_write_reuses_container() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(api.clone(), ShardedSettings { shard: false, ..ShardedSettings::default() });

        storage.receive_blob(Ref::generate("a"), reader(b"a")).await.unwrap();
        storage.receive_blob(Ref::generate("b"), reader(b"b")).await.unwrap();

        let stats = api.stats();
        assert_eq!(stats.container_creates.load(Ordering::SeqCst), 1);
        assert_eq!(stats.puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_acl_mismatch_fails_write() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(api.clone(), ShardedSettings { shard: false, ..ShardedSettings::default() });
        api.force_acl("blobs", "private").await;

        let err = storage.receive_blob(Ref::generate("a"), reader(b"a")).await.unwrap_err();
        assert!(matches!(err, StorageError::AclMismatch { .. }));
        assert_eq!(api.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_oversize_blob_is_rejected() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(
            api.clone(),
            ShardedSettings {
                max_blob_size: 8,
                max_in_memory: 4,
                ..ShardedSettings::default()
            },
        );

        let exact = storage.receive_blob(Ref::generate("a"), reader(&[1u8; 8])).await.unwrap();
        assert_eq!(exact.size(), 8);

        let err = storage.receive_blob(Ref::generate("b"), reader(&[1u8; 9])).await.unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { limit: 8 }));
        assert_eq!(api.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_oversize_wins_over_spool_cleanup_failure() {
        let temp = TempDir::new().unwrap();
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(
            api.clone(),
            ShardedSettings {
                max_blob_size: 20,
                max_in_memory: 4,
                spool_dir: Some(temp.path().to_path_buf()),
                ..ShardedSettings::default()
            },
        );

        // the spill file vanishes mid-upload, so removing it afterwards fails
        let dir = temp.path().to_path_buf();
        let clear = move || -> io::Result<()> {
            for entry in std::fs::read_dir(&dir)? {
                std::fs::remove_file(entry?.path())?;
            }
            Ok(())
        };
        let source = split_reader(&[1u8; 16], clear, &[2u8; 16]);

        let err = storage.receive_blob(Ref::generate("big"), source).await.unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { limit: 20 }));
        assert_eq!(api.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_source_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(
            api.clone(),
            ShardedSettings {
                max_in_memory: 4,
                spool_dir: Some(temp.path().to_path_buf()),
                ..ShardedSettings::default()
            },
        );

        let fail = || -> io::Result<()> { Err(io::Error::new(io::ErrorKind::InvalidData, "incomplete stream")) };
        let source = split_reader(&[1u8; 16], fail, &[]);
        let err = storage.receive_blob(Ref::generate("cut"), source).await.unwrap_err();
        assert!(matches!(&err, StorageError::InvalidInput(msg) if msg.contains("incomplete stream")));

        let fail = || -> io::Result<()> { Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")) };
        let source = split_reader(&[1u8; 16], fail, &[]);
        let err = storage.receive_blob(Ref::generate("cut"), source).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        assert_eq!(api.object_count().await, 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stat_reports_only_existing() {
        let storage = storage_over(Arc::new(MemoryObjectApi::new()), ShardedSettings::default());
        let stored = storage.receive_blob(Ref::generate("a.txt"), reader(b"abc")).await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let refs = vec![stored.blob_ref().clone(), Ref::generate("missing")];
        storage.stat_blobs(&tx, &refs).await.unwrap();
        drop(tx);

        let mut found = Vec::new();
        while let Some(info) = rx.recv().await {
            found.push(info);
        }
        assert_eq!(found, vec![stored]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(api.clone(), ShardedSettings::default());
        let stored = storage.receive_blob(Ref::generate("a"), reader(b"abc")).await.unwrap();
        let refs = vec![stored.blob_ref().clone()];

        storage.remove_blobs(&refs).await.unwrap();
        storage.remove_blobs(&refs).await.unwrap();
        assert_eq!(api.object_count().await, 0);

        // never-created container is fine too
        storage.remove_blobs(&[Ref::parse("nowhere/x.bin").unwrap()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let storage = storage_over(Arc::new(MemoryObjectApi::new()), ShardedSettings::default());
        let err = storage.fetch(&Ref::generate("x")).await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat_concurrency_is_gated() {
        let api = Arc::new(MemoryObjectApi::new().with_latency(Duration::from_micros(200)));
        let storage = storage_over(api.clone(), ShardedSettings::default());

        let refs: Vec<Ref> = (0..10_000).map(|i| Ref::generate(&format!("{}.bin", i))).collect();
        let (tx, mut rx) = mpsc::channel(64);
        let drain = tokio::spawn(async move {
            let mut n = 0;
            while rx.recv().await.is_some() {
                n += 1;
            }
            n
        });

        storage.stat_blobs(&tx, &refs).await.unwrap();
        drop(tx);

        assert_eq!(drain.await.unwrap(), 0);
        let stats = api.stats();
        assert_eq!(stats.heads.load(Ordering::SeqCst), 10_000);
        assert!(stats.peak_in_flight.load(Ordering::SeqCst) <= DEFAULT_GATE_LIMIT);
    }

    #[tokio::test]
    async fn test_init_containers() {
        let api = Arc::new(MemoryObjectApi::new());
        let storage = storage_over(api.clone(), ShardedSettings::default());
        storage.init_containers().await.unwrap();

        let names = api.container_names().await;
        assert_eq!(names.len(), SHARD_COUNT);
        assert!(names.contains(&"blobs-3ff".to_string()));
    }

    #[tokio::test]
    async fn test_init_containers_reports_acl_failure() {
        let api = Arc::new(MemoryObjectApi::new());
        api.force_acl("blobs-00", "private").await;
        let storage = storage_over(api.clone(), ShardedSettings::default());

        let err = storage.init_containers().await.unwrap_err();
        assert!(matches!(err, StorageError::AclMismatch { .. }));
        // every attempt was made on the failing container
        assert!(api.stats().container_creates.load(Ordering::SeqCst) >= SHARD_COUNT + 2);
    }
}

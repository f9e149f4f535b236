//! Digest-verifying spool
//!
//! Buffers one inbound blob while computing its MD5, so the backend PUT can
//! carry the digest as an integrity check. Content stays in memory up to a
//! threshold; past it, everything moves to a temporary file.
//!
//! ```text
//! Writing ──first read/seek/open──▶ Reading
//! ```
//!
//! The transition is one-way. Writing after reading has begun is a contract
//! violation and fails with [`StorageError::InvalidState`].

use crate::blob_ref::{BlobReader, Ref};
use crate::error::StorageError;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// In-memory threshold before a blob spills to disk (8MB)
pub const DEFAULT_MAX_IN_MEMORY: usize = 8 << 20;

enum Reader {
    Memory(Cursor<Bytes>),
    File(File),
}

enum State {
    Writing,
    Reading(Reader),
}

struct Spill {
    path: TempPath,
    file: Option<File>,
}

/// Write-then-read buffer for a single blob.
pub struct Spool {
    prefix: String,
    dir: Option<PathBuf>,
    threshold: usize,
    md5: Md5,
    len: u64,
    buf: Vec<u8>,
    content: Bytes,
    spill: Option<Spill>,
    state: State,
}

impl Spool {
    /// Create a spool for `blob_ref`; temp files go to the system temp dir.
    pub fn new(blob_ref: &Ref, threshold: usize) -> Self {
        Self {
            // temp file prefix, slashes would be read as directories
            prefix: blob_ref.to_string().replace('/', "-"),
            dir: None,
            threshold,
            md5: Md5::new(),
            len: 0,
            buf: Vec::new(),
            content: Bytes::new(),
            spill: None,
            state: State::Writing,
        }
    }

    /// Place spill files under `dir` instead of the system temp dir.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append bytes, updating the running digest.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StorageError> {
        if !matches!(self.state, State::Writing) {
            return Err(StorageError::InvalidState(format!(
                "write after read on spool {}",
                self.prefix
            )));
        }

        self.md5.update(data);

        if self.spill.is_none() && self.buf.len() + data.len() > self.threshold {
            self.spill_to_disk().await?;
        }

        match self.spill.as_mut().and_then(|s| s.file.as_mut()) {
            Some(file) => file.write_all(data).await?,
            None => self.buf.extend_from_slice(data),
        }

        self.len += data.len() as u64;
        Ok(data.len())
    }

    async fn spill_to_disk(&mut self) -> Result<(), StorageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);
        let temp = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let (std_file, path) = temp.into_parts();
        let mut file = File::from_std(std_file);
        file.write_all(&self.buf).await?;

        debug!(
            path = %path.display(),
            buffered = self.buf.len(),
            "Spool spilled to disk"
        );

        self.buf = Vec::new();
        self.spill = Some(Spill {
            path,
            file: Some(file),
        });
        Ok(())
    }

    async fn begin_reading(&mut self) -> Result<&mut Reader, StorageError> {
        if matches!(self.state, State::Writing) {
            let reader = match self.spill.as_mut().and_then(|s| s.file.take()) {
                Some(mut file) => {
                    file.flush().await?;
                    file.seek(SeekFrom::Start(0)).await?;
                    Reader::File(file)
                }
                None => {
                    self.content = Bytes::from(std::mem::take(&mut self.buf));
                    Reader::Memory(Cursor::new(self.content.clone()))
                }
            };
            self.state = State::Reading(reader);
        }

        match &mut self.state {
            State::Reading(reader) => Ok(reader),
            State::Writing => Err(StorageError::Internal("spool did not enter reading state".into())),
        }
    }

    /// Read spooled bytes. The first call ends the writing phase.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = match self.begin_reading().await? {
            Reader::Memory(cursor) => cursor.read(buf).await?,
            Reader::File(file) => file.read(buf).await?,
        };
        Ok(n)
    }

    /// Reposition the read cursor. The first call ends the writing phase.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, StorageError> {
        let offset = match self.begin_reading().await? {
            Reader::Memory(cursor) => cursor.seek(pos).await?,
            Reader::File(file) => file.seek(pos).await?,
        };
        Ok(offset)
    }

    /// Open an independent reader over the whole content. Can be called any
    /// number of times, e.g. once per upload attempt.
    pub async fn open(&mut self) -> Result<BlobReader, StorageError> {
        self.begin_reading().await?;

        match &self.spill {
            Some(spill) => {
                let file = File::open(&spill.path).await?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(Cursor::new(self.content.clone()))),
        }
    }

    /// Hex MD5 of every byte written so far.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.md5.clone().finalize())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the content moved to a temporary file.
    pub fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }

    /// Remove the temporary file, if any. Dropping the spool does the same
    /// but swallows the error.
    pub async fn cleanup(mut self) -> Result<(), StorageError> {
        self.state = State::Writing;
        if let Some(spill) = self.spill.take() {
            drop(spill.file);
            spill.path.close()?;
        }
        Ok(())
    }
}

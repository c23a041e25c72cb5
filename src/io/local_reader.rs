use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of [`RangeReader`].
///
/// `tokio::fs::File` has no positioned-read primitive that is both async and
/// safe under concurrent callers, so reads are serialised behind a mutex
/// guarding a single shared file handle (mirroring the donor's approach of
/// centralising stateful I/O behind one lock rather than opening a handle
/// per read).
pub struct LocalRangeReader {
    file: Mutex<File>,
    size: u64,
    identifier: String,
}

impl LocalRangeReader {
    /// Open `path` and stat its size. Fails with [`IoError::NotFound`] if the
    /// file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.display().to_string())
            } else {
                IoError::from(e)
            }
        })?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
            identifier: path.display().to_string(),
        })
    }
}

#[async_trait]
impl RangeReader for LocalRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buf = BytesMut::zeroed(len);
        file.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Opens local files under a fixed root directory by slide identifier,
/// mirroring the role the donor's `S3SlideSource` plays for S3 keys.
pub struct LocalSlideSource {
    root: PathBuf,
}

impl LocalSlideSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a slide identifier to a path under the configured root,
    /// rejecting identifiers that would escape it via `..` segments.
    pub fn resolve(&self, slide_id: &str) -> Result<PathBuf, IoError> {
        if slide_id.split('/').any(|segment| segment == "..") {
            return Err(IoError::NotFound(slide_id.to_string()));
        }
        Ok(self.root.join(slide_id))
    }

    pub async fn open(&self, slide_id: &str) -> Result<Arc<LocalRangeReader>, IoError> {
        let path = self.resolve(slide_id)?;
        Ok(Arc::new(LocalRangeReader::open(path).await?))
    }
}

//! Local-filesystem slide source: `assets.directory`-rooted, per §6.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IoError;
use crate::io::{LocalRangeReader, LocalSlideSource as LocalAssetRoot};

use super::SlideSource;

/// `SlideSource` over files under a configured root directory. The slide ID
/// is the path relative to that root.
pub struct LocalFileSlideSource {
    root: LocalAssetRoot,
}

impl LocalFileSlideSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: LocalAssetRoot::new(root),
        }
    }
}

#[async_trait]
impl SlideSource for LocalFileSlideSource {
    type Reader = Arc<LocalRangeReader>;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError> {
        self.root.open(slide_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::RangeReader;
    use std::io::Write;

    #[tokio::test]
    async fn test_create_reader_reads_file_under_root() {
        let dir = tempfile_dir();
        std::fs::write(dir.join("slide.tif"), b"tiff-bytes").unwrap();

        let source = LocalFileSlideSource::new(&dir);
        let reader = source.create_reader("slide.tif").await.unwrap();
        let data = reader.read_exact_at(0, 10).await.unwrap();
        assert_eq!(&data[..], b"tiff-bytes");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_create_reader_rejects_traversal() {
        let dir = tempfile_dir();
        let source = LocalFileSlideSource::new(&dir);
        let result = source.create_reader("../escape.tif").await;
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("wsi-slide-reader-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut marker = std::fs::File::create(dir.join(".keep")).unwrap();
        marker.write_all(b"").unwrap();
        dir
    }
}

//! `Slide`: one open image file. Owns a byte-range source (wrapped in the
//! metadata [`BlockCache`]) and the [`Pyramid`] parsed from it; the pyramid
//! is immutable once `open` returns.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::error::CoreError;
use crate::format::tiff::{parser, pyramid, Pyramid, TiffHeader, BIGTIFF_HEADER_SIZE};
use crate::io::{BlockCache, RangeReader};
use crate::slide::assembler;

/// One pyramid resolution level's shape, as surfaced on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct LevelMetadata {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_count_horizontal: u32,
    pub tile_count_vertical: u32,
}

/// `PyramidMetadata` wire shape (§6): the per-level geometry a caller needs
/// to address tiles, with no file-layout detail leaked.
#[derive(Debug, Clone, Serialize)]
pub struct PyramidMetadata {
    pub levels: Vec<LevelMetadata>,
}

/// An opened slide: a byte-range source plus its parsed pyramid.
pub struct Slide<R: RangeReader + 'static> {
    reader: Arc<BlockCache<R>>,
    pyramid: Pyramid,
}

impl<R: RangeReader + 'static> Slide<R> {
    /// Parse `reader`'s TIFF/BigTIFF header and IFD chain, classify the
    /// pyramid, then drop the metadata block cache's memoised spans — tile
    /// and strip payload reads never go through it.
    pub async fn open(reader: R) -> Result<Self, CoreError> {
        let cache = BlockCache::new(reader);
        let size = cache.size();

        let probe_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = cache.read_block(0, probe_len).await?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        let ifds = parser::walk_ifd_chain(&cache, &header).await?;
        let pyramid = pyramid::classify(&cache, &header, ifds).await?;

        cache.close_metadata().await;

        Ok(Self {
            reader: Arc::new(cache),
            pyramid,
        })
    }

    /// This slide's pyramid metadata, in the §6 wire shape.
    pub fn metadata(&self) -> PyramidMetadata {
        PyramidMetadata {
            levels: self
                .pyramid
                .levels
                .iter()
                .map(|level| LevelMetadata {
                    image_width: level.image_width,
                    image_height: level.image_height,
                    tile_width: level.tile_width,
                    tile_height: level.tile_height,
                    tile_count_horizontal: level.tile_count_horizontal(),
                    tile_count_vertical: level.tile_count_vertical(),
                })
                .collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len()
    }

    pub fn extra_image_count(&self) -> usize {
        self.pyramid.extras.len()
    }

    /// Self-contained JPEG for tile `(x, y)` of `level`, per §4.6.
    pub async fn get_tile(&self, level: usize, x: u32, y: u32) -> Result<Bytes, CoreError> {
        assembler::get_tile(self.reader.as_ref(), &self.pyramid, level, x, y).await
    }

    /// Self-contained JPEG for the `index`-th non-pyramid image.
    pub async fn get_extra_image(&self, index: usize) -> Result<Bytes, CoreError> {
        assembler::get_extra_image(self.reader.as_ref(), &self.pyramid, index).await
    }

    /// Release the backing byte-range source. Called by the reader cache's
    /// eviction callback once every borrower has dropped its handle.
    pub async fn close(&self) {
        self.reader.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use async_trait::async_trait;

    struct MemReader {
        data: Bytes,
    }

    #[async_trait]
    impl RangeReader for MemReader {
        async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
            let start = offset as usize;
            let end = start + len;
            if end > self.data.len() {
                return Err(IoError::RangeOutOfBounds {
                    offset,
                    requested: len as u64,
                    size: self.data.len() as u64,
                });
            }
            Ok(self.data.slice(start..end))
        }
        fn size(&self) -> u64 {
            self.data.len() as u64
        }
        fn identifier(&self) -> &str {
            "mock://mem"
        }
    }

    fn write_entry(data: &mut [u8], offset: &mut usize, tag: u16, typ: u16, count: u32, value: u32) {
        data[*offset..*offset + 2].copy_from_slice(&tag.to_le_bytes());
        data[*offset + 2..*offset + 4].copy_from_slice(&typ.to_le_bytes());
        data[*offset + 4..*offset + 8].copy_from_slice(&count.to_le_bytes());
        data[*offset + 8..*offset + 12].copy_from_slice(&value.to_le_bytes());
        *offset += 12;
    }

    /// A single-level, single-tile classic TIFF: tile 0 holds a complete
    /// (if minimal) JPEG stream.
    fn minimal_tiff() -> Vec<u8> {
        let mut data = vec![0u8; 2048];
        data[0..8].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
        data[8..10].copy_from_slice(&7u16.to_le_bytes());

        let mut offset = 10;
        write_entry(&mut data, &mut offset, 256, 4, 1, 64); // ImageWidth
        write_entry(&mut data, &mut offset, 257, 4, 1, 64); // ImageLength
        write_entry(&mut data, &mut offset, 259, 3, 1, 7); // Compression = JPEG
        write_entry(&mut data, &mut offset, 322, 3, 1, 64); // TileWidth
        write_entry(&mut data, &mut offset, 323, 3, 1, 64); // TileLength
        write_entry(&mut data, &mut offset, 324, 4, 1, 1024); // TileOffsets -> 1024
        write_entry(&mut data, &mut offset, 325, 4, 1, 90); // TileByteCounts = 90
        data[offset..offset + 4].copy_from_slice(&0u32.to_le_bytes());

        data[1024] = 0xFF;
        data[1025] = 0xD8;
        data[1026] = 0xFF;
        data[1027] = 0xDB;
        data[1111] = 0xFF;
        data[1112] = 0xD9;
        data
    }

    #[tokio::test]
    async fn test_open_classifies_single_level() {
        let slide = Slide::open(MemReader {
            data: Bytes::from(minimal_tiff()),
        })
        .await
        .unwrap();

        assert_eq!(slide.level_count(), 1);
        assert_eq!(slide.extra_image_count(), 0);
        let metadata = slide.metadata();
        assert_eq!(metadata.levels[0].image_width, 64);
        assert_eq!(metadata.levels[0].tile_count_horizontal, 1);
    }
}

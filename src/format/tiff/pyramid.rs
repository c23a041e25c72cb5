//! Pyramid classification: partitioning an IFD chain into resolution levels
//! and extra (label/macro/thumbnail) images by tile/strip geometry.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::CoreError;
use crate::io::{BlockCache, RangeReader};

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader};
use super::tags::{compression, tag_id};
use super::values::ValueReader;

/// One resolution level, or one non-pyramid image (label/macro/thumbnail) —
/// same shape, different role within a [`Pyramid`].
#[derive(Debug, Clone)]
pub struct Level {
    pub ifd_index: usize,
    pub image_width: u32,
    pub image_height: u32,
    /// 0 if this IFD is strip-organised.
    pub tile_width: u32,
    pub tile_height: u32,
    /// 0 if this IFD is tile-organised.
    pub rows_per_strip: u32,
    pub compression: u16,
    pub photometric: u16,
    pub predictor: u16,
    pub jpeg_tables: Option<Bytes>,
    pub icc_profile: Option<Bytes>,
    pub tile_offsets: Option<Vec<u64>>,
    pub tile_byte_counts: Option<Vec<u64>>,
    pub strip_offsets: Option<Vec<u64>>,
    pub strip_byte_counts: Option<Vec<u64>>,
    /// The IFD's complete tag table, for debug echoing.
    pub tags: HashMap<u16, IfdEntry>,
}

/// Same shape as [`Level`]; kept as a distinct alias so call sites read as
/// what they mean rather than reusing `Level` out of context.
pub type ExtraImage = Level;

impl Level {
    /// `ceil(image_width / tile_width)`; strip-organised levels are treated
    /// as a single column, so `get_tile(level, 0, y)` is the only valid x.
    pub fn tile_count_horizontal(&self) -> u32 {
        if self.tile_width == 0 {
            1
        } else {
            self.image_width.div_ceil(self.tile_width)
        }
    }

    /// `ceil(image_height / tile_height)`; strip-organised levels are a
    /// single row.
    pub fn tile_count_vertical(&self) -> u32 {
        if self.tile_height == 0 {
            1
        } else {
            self.image_height.div_ceil(self.tile_height)
        }
    }

    pub fn is_tiled(&self) -> bool {
        self.tile_offsets.is_some()
    }

    pub fn is_striped(&self) -> bool {
        self.strip_offsets.is_some()
    }

    /// `(offset, byte_count)` for tile `i`. `TagNotFound(TILE_OFFSETS)` signals
    /// a strip-organised level — the assembler switches paths on this.
    pub fn tile_location(&self, i: u32) -> Result<(u64, u64), CoreError> {
        let offsets = self
            .tile_offsets
            .as_ref()
            .ok_or(CoreError::TagNotFound(tag_id::TILE_OFFSETS))?;
        let byte_counts = self.tile_byte_counts.as_ref().unwrap();
        let idx = i as usize;
        if idx >= offsets.len() {
            return Err(CoreError::IndexOutOfRange {
                index: i as u64,
                limit: offsets.len() as u64,
            });
        }
        Ok((offsets[idx], byte_counts[idx]))
    }

    /// `(offset, byte_count)` for strip `i`.
    pub fn strip_location(&self, i: u32) -> Result<(u64, u64), CoreError> {
        let offsets = self
            .strip_offsets
            .as_ref()
            .ok_or(CoreError::TagNotFound(tag_id::STRIP_OFFSETS))?;
        let byte_counts = self.strip_byte_counts.as_ref().unwrap();
        let idx = i as usize;
        if idx >= offsets.len() {
            return Err(CoreError::IndexOutOfRange {
                index: i as u64,
                limit: offsets.len() as u64,
            });
        }
        Ok((offsets[idx], byte_counts[idx]))
    }

    pub fn strip_count(&self) -> u32 {
        self.strip_offsets.as_ref().map_or(0, |o| o.len() as u32)
    }
}

/// A parsed pyramid: the ordered resolution levels plus every other IFD in
/// the file, flattened.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<Level>,
    pub extras: Vec<ExtraImage>,
}

impl Pyramid {
    /// First ICC profile found scanning levels in order, per the
    /// first-found-wins policy (mirrors the fallback an embedded profile on
    /// one level is expected to cover every level of the same slide).
    pub fn resolve_icc_profile(&self) -> Option<&Bytes> {
        self.levels.iter().find_map(|l| l.icc_profile.as_ref())
    }
}

/// Compute the `(TileWidth, TileLength, RowsPerStrip)` signature of an IFD,
/// treating missing tags as zero.
async fn signature<R: RangeReader + 'static>(
    ifd: &Ifd,
    header: &TiffHeader,
    cache: &BlockCache<R>,
) -> Result<(u32, u32, u32), CoreError> {
    let vr = ValueReader::new(cache, header);
    let tile_width = match ifd.get_entry_by_tag(tag_id::TILE_WIDTH) {
        Some(e) => vr.read_u32(e).await?,
        None => 0,
    };
    let tile_length = match ifd.get_entry_by_tag(tag_id::TILE_LENGTH) {
        Some(e) => vr.read_u32(e).await?,
        None => 0,
    };
    let rows_per_strip = match ifd.get_entry_by_tag(tag_id::ROWS_PER_STRIP) {
        Some(e) => vr.read_u32(e).await?,
        None => 0,
    };
    Ok((tile_width, tile_length, rows_per_strip))
}

/// Group `ifds` by pyramid signature (§4.4): the largest group in file
/// order becomes the ordered pyramid; everything else is flattened, in
/// file order, into extras.
pub async fn classify<R: RangeReader + 'static>(
    cache: &BlockCache<R>,
    header: &TiffHeader,
    ifds: Vec<(u64, Ifd)>,
) -> Result<Pyramid, CoreError> {
    let mut groups: Vec<((u32, u32, u32), Vec<usize>)> = Vec::new();

    for (idx, (_, ifd)) in ifds.iter().enumerate() {
        let sig = signature(ifd, header, cache).await?;
        match groups.iter_mut().find(|(s, _)| *s == sig) {
            Some((_, members)) => members.push(idx),
            None => groups.push((sig, vec![idx])),
        }
    }

    // `max_by_key` returns the *last* of several equally-maximal elements;
    // groups are in file-encounter order, so scan by hand to keep ties
    // resolved toward the first-encountered signature instead.
    let mut main_group: Vec<usize> = Vec::new();
    for (_, members) in &groups {
        if members.len() > main_group.len() {
            main_group = members.clone();
        }
    }
    let main_set: std::collections::HashSet<usize> = main_group.iter().copied().collect();

    let mut levels = Vec::with_capacity(main_group.len());
    for &idx in &main_group {
        let (_, ifd) = &ifds[idx];
        levels.push(resolve_level(ifd, idx, header, cache).await?);
    }

    let mut extras = Vec::new();
    for (idx, (_, ifd)) in ifds.iter().enumerate() {
        if !main_set.contains(&idx) {
            extras.push(resolve_level(ifd, idx, header, cache).await?);
        }
    }

    Ok(Pyramid { levels, extras })
}

async fn resolve_level<R: RangeReader + 'static>(
    ifd: &Ifd,
    ifd_index: usize,
    header: &TiffHeader,
    cache: &BlockCache<R>,
) -> Result<Level, CoreError> {
    let vr = ValueReader::new(cache, header);

    let image_width = read_u32_or(&vr, ifd, tag_id::IMAGE_WIDTH, 0).await?;
    let image_height = read_u32_or(&vr, ifd, tag_id::IMAGE_LENGTH, 0).await?;
    let tile_width = read_u32_or(&vr, ifd, tag_id::TILE_WIDTH, 0).await?;
    let tile_height = read_u32_or(&vr, ifd, tag_id::TILE_LENGTH, 0).await?;
    let rows_per_strip = read_u32_or(&vr, ifd, tag_id::ROWS_PER_STRIP, 0).await?;
    let compression_value = read_u32_or(&vr, ifd, tag_id::COMPRESSION, compression::NONE as u32).await? as u16;
    let photometric = read_u32_or(&vr, ifd, tag_id::PHOTOMETRIC_INTERPRETATION, 0).await? as u16;
    let predictor = read_u32_or(&vr, ifd, tag_id::PREDICTOR, 1).await? as u16;

    let jpeg_tables = match ifd.get_entry_by_tag(tag_id::JPEG_TABLES) {
        Some(e) => Some(vr.read_raw_bytes(e).await?),
        None => None,
    };
    let icc_profile = match ifd.get_entry_by_tag(tag_id::ICC_PROFILE) {
        Some(e) => Some(vr.read_raw_bytes(e).await?),
        None => None,
    };

    let (tile_offsets, tile_byte_counts) =
        match ifd.get_entry_by_tag(tag_id::TILE_OFFSETS) {
            Some(offsets_entry) => {
                let offsets = vr.read_u64_array(offsets_entry).await?;
                let byte_counts = match ifd.get_entry_by_tag(tag_id::TILE_BYTE_COUNTS) {
                    Some(e) => vr.read_u64_array(e).await?,
                    None => vec![0; offsets.len()],
                };
                (Some(offsets), Some(byte_counts))
            }
            None => (None, None),
        };

    let (strip_offsets, strip_byte_counts) =
        match ifd.get_entry_by_tag(tag_id::STRIP_OFFSETS) {
            Some(offsets_entry) => {
                let offsets = vr.read_u64_array(offsets_entry).await?;
                let byte_counts = match ifd.get_entry_by_tag(tag_id::STRIP_BYTE_COUNTS) {
                    Some(e) => vr.read_u64_array(e).await?,
                    None => vec![0; offsets.len()],
                };
                (Some(offsets), Some(byte_counts))
            }
            None => (None, None),
        };

    let tags = ifd
        .entries
        .iter()
        .map(|e| (e.tag_id, e.clone()))
        .collect();

    Ok(Level {
        ifd_index,
        image_width,
        image_height,
        tile_width,
        tile_height,
        rows_per_strip,
        compression: compression_value,
        photometric,
        predictor,
        jpeg_tables,
        icc_profile,
        tile_offsets,
        tile_byte_counts,
        strip_offsets,
        strip_byte_counts,
        tags,
    })
}

async fn read_u32_or<R: RangeReader + 'static>(
    vr: &ValueReader<'_, BlockCache<R>>,
    ifd: &Ifd,
    tag: u16,
    default: u32,
) -> Result<u32, CoreError> {
    match ifd.get_entry_by_tag(tag) {
        Some(e) => vr.read_u32(e).await,
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tiff::tags::FieldType;
    use async_trait::async_trait;
    use crate::error::IoError;

    struct EmptyReader;

    #[async_trait]
    impl RangeReader for EmptyReader {
        async fn read_exact_at(&self, _offset: u64, _len: usize) -> Result<Bytes, IoError> {
            Ok(Bytes::new())
        }
        fn size(&self) -> u64 {
            0
        }
        fn identifier(&self) -> &str {
            "mock://empty"
        }
    }

    fn header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    fn inline_entry(tag: u16, value: u32) -> IfdEntry {
        IfdEntry {
            tag_id: tag,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 1,
            value_offset_bytes: value.to_le_bytes().to_vec(),
            is_inline: true,
        }
    }

    fn ifd_with(entries: Vec<IfdEntry>) -> Ifd {
        let mut entries_by_tag = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            entries_by_tag.insert(e.tag_id, i);
        }
        Ifd {
            entries,
            entries_by_tag,
            next_ifd_offset: 0,
        }
    }

    #[tokio::test]
    async fn test_largest_signature_group_is_main_pyramid() {
        let cache = BlockCache::new(EmptyReader);
        let h = header();

        // Three IFDs sharing (256, 256, 0): the pyramid. One IFD with a
        // different signature: the label.
        let pyramid_ifd = || {
            ifd_with(vec![
                inline_entry(tag_id::IMAGE_WIDTH, 1024),
                inline_entry(tag_id::IMAGE_LENGTH, 768),
                inline_entry(tag_id::TILE_WIDTH, 256),
                inline_entry(tag_id::TILE_LENGTH, 256),
            ])
        };
        let label_ifd = ifd_with(vec![
            inline_entry(tag_id::IMAGE_WIDTH, 500),
            inline_entry(tag_id::IMAGE_LENGTH, 500),
            inline_entry(tag_id::TILE_WIDTH, 500),
            inline_entry(tag_id::TILE_LENGTH, 500),
        ]);

        let ifds = vec![
            (0, pyramid_ifd()),
            (1, pyramid_ifd()),
            (2, label_ifd),
            (3, pyramid_ifd()),
        ];

        let pyramid = classify(&cache, &h, ifds).await.unwrap();
        assert_eq!(pyramid.levels.len(), 3);
        assert_eq!(pyramid.extras.len(), 1);
        assert_eq!(pyramid.levels[0].ifd_index, 0);
        assert_eq!(pyramid.levels[1].ifd_index, 1);
        assert_eq!(pyramid.levels[2].ifd_index, 3);
        assert_eq!(pyramid.extras[0].ifd_index, 2);
    }

    #[test]
    fn test_tile_count_strip_organised_is_one() {
        let level = Level {
            ifd_index: 0,
            image_width: 4096,
            image_height: 4096,
            tile_width: 0,
            tile_height: 0,
            rows_per_strip: 64,
            compression: compression::JPEG,
            photometric: 2,
            predictor: 1,
            jpeg_tables: None,
            icc_profile: None,
            tile_offsets: None,
            tile_byte_counts: None,
            strip_offsets: Some(vec![0; 64]),
            strip_byte_counts: Some(vec![0; 64]),
            tags: HashMap::new(),
        };
        assert_eq!(level.tile_count_horizontal(), 1);
        assert_eq!(level.tile_count_vertical(), 1);
    }

    #[test]
    fn test_tile_location_missing_offsets_is_tag_not_found() {
        let level = Level {
            ifd_index: 0,
            image_width: 100,
            image_height: 100,
            tile_width: 0,
            tile_height: 0,
            rows_per_strip: 10,
            compression: compression::JPEG,
            photometric: 2,
            predictor: 1,
            jpeg_tables: None,
            icc_profile: None,
            tile_offsets: None,
            tile_byte_counts: None,
            strip_offsets: Some(vec![1, 2, 3]),
            strip_byte_counts: Some(vec![10, 10, 10]),
            tags: HashMap::new(),
        };
        assert!(matches!(
            level.tile_location(0),
            Err(CoreError::TagNotFound(t)) if t == tag_id::TILE_OFFSETS
        ));
    }

    #[test]
    fn test_strip_location_index_out_of_range() {
        let level = Level {
            ifd_index: 0,
            image_width: 100,
            image_height: 100,
            tile_width: 0,
            tile_height: 0,
            rows_per_strip: 10,
            compression: compression::JPEG,
            photometric: 2,
            predictor: 1,
            jpeg_tables: None,
            icc_profile: None,
            tile_offsets: None,
            tile_byte_counts: None,
            strip_offsets: Some(vec![1, 2, 3]),
            strip_byte_counts: Some(vec![10, 10, 10]),
            tags: HashMap::new(),
        };
        assert!(matches!(
            level.strip_location(3),
            Err(CoreError::IndexOutOfRange { index: 3, limit: 3 })
        ));
    }

    #[test]
    fn test_resolve_icc_profile_first_found_wins() {
        let mut level_without = |idx| Level {
            ifd_index: idx,
            image_width: 100,
            image_height: 100,
            tile_width: 100,
            tile_height: 100,
            rows_per_strip: 0,
            compression: compression::JPEG,
            photometric: 2,
            predictor: 1,
            jpeg_tables: None,
            icc_profile: None,
            tile_offsets: Some(vec![0]),
            tile_byte_counts: Some(vec![0]),
            strip_offsets: None,
            strip_byte_counts: None,
            tags: HashMap::new(),
        };
        let mut l0 = level_without(0);
        let l1 = level_without(1);
        let mut l2 = level_without(2);
        l2.icc_profile = Some(Bytes::from_static(b"profile-on-level-2"));
        l0.icc_profile = None;

        let pyramid = Pyramid {
            levels: vec![l0, l1, l2],
            extras: vec![],
        };
        assert_eq!(
            pyramid.resolve_icc_profile().unwrap(),
            &Bytes::from_static(b"profile-on-level-2")
        );
    }
}

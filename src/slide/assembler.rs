//! Tile and strip assembly: the read path from pyramid metadata to a
//! self-contained JPEG for a tile, a strip-organised level, or an extra
//! image.
//!
//! The tiled path (§4.6) merges a tile's raw bytes against the level's
//! shared `JPEGTables`/ICC profile and, for edge tiles, crops to the
//! declared image extent. The strip path re-composes a whole level (or
//! extra image) from its strips into one RGBA canvas and re-encodes it as
//! a single baseline JPEG; it is the only path extra images ever take.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};

use crate::error::CoreError;
use crate::format::jpeg;
use crate::format::tiff::{compression, photometric, predictor, tag_id, Level, Pyramid};
use crate::io::RangeReader;

/// Quality used when the assembler re-encodes pixels it has decoded (edge
/// tile crop, strip reassembly). Passthrough tiles are never re-encoded.
const REENCODE_QUALITY: u8 = 90;

/// Fetch and assemble tile `(x, y)` of `level_idx` in `pyramid`, per §4.6.
pub async fn get_tile<R: RangeReader>(
    reader: &R,
    pyramid: &Pyramid,
    level_idx: usize,
    x: u32,
    y: u32,
) -> Result<Bytes, CoreError> {
    let level = pyramid
        .levels
        .get(level_idx)
        .ok_or(CoreError::IndexOutOfRange {
            index: level_idx as u64,
            limit: pyramid.levels.len() as u64,
        })?;

    let tiles_h = level.tile_count_horizontal();
    let tiles_v = level.tile_count_vertical();
    if x >= tiles_h {
        return Err(CoreError::IndexOutOfRange {
            index: x as u64,
            limit: tiles_h as u64,
        });
    }
    if y >= tiles_v {
        return Err(CoreError::IndexOutOfRange {
            index: y as u64,
            limit: tiles_v as u64,
        });
    }

    let tile_index = y * tiles_h + x;

    match level.tile_location(tile_index) {
        Ok((offset, size)) => assemble_tile(reader, pyramid, level, x, y, offset, size).await,
        Err(CoreError::TagNotFound(tag)) if tag == tag_id::TILE_OFFSETS => {
            reassemble_strips(reader, pyramid, level).await
        }
        Err(e) => Err(e),
    }
}

/// Fetch the `index`-th non-pyramid image (label, macro, thumbnail). Always
/// goes through strip reassembly, regardless of how the image is stored.
pub async fn get_extra_image<R: RangeReader>(
    reader: &R,
    pyramid: &Pyramid,
    index: usize,
) -> Result<Bytes, CoreError> {
    let extra = pyramid
        .extras
        .get(index)
        .ok_or(CoreError::IndexOutOfRange {
            index: index as u64,
            limit: pyramid.extras.len() as u64,
        })?;
    reassemble_strips(reader, pyramid, extra).await
}

fn resolve_icc(level: &Level, pyramid: &Pyramid) -> Option<Bytes> {
    level
        .icc_profile
        .clone()
        .or_else(|| pyramid.resolve_icc_profile().cloned())
}

/// `(expected_width, expected_height)` of tile `(x, y)`: full tile size
/// except on the last column/row, which is cropped to the remainder of
/// `image_width`/`image_height`.
fn expected_tile_size(level: &Level, x: u32, y: u32) -> (u32, u32) {
    let tiles_h = level.tile_count_horizontal();
    let tiles_v = level.tile_count_vertical();

    let width = if x + 1 == tiles_h {
        let remainder = level.image_width % level.tile_width;
        if remainder == 0 {
            level.tile_width
        } else {
            remainder
        }
    } else {
        level.tile_width
    };

    let height = if y + 1 == tiles_v {
        let remainder = level.image_height % level.tile_height;
        if remainder == 0 {
            level.tile_height
        } else {
            remainder
        }
    } else {
        level.tile_height
    };

    (width, height)
}

async fn assemble_tile<R: RangeReader>(
    reader: &R,
    pyramid: &Pyramid,
    level: &Level,
    x: u32,
    y: u32,
    offset: u64,
    size: u64,
) -> Result<Bytes, CoreError> {
    if level.compression != compression::JPEG && level.compression != compression::OLD_JPEG {
        return Err(CoreError::UnsupportedCompression(level.compression));
    }

    let raw = reader.read_exact_at(offset, size as usize).await?;
    let icc = resolve_icc(level, pyramid);

    let (assembled, width, height) = if level.jpeg_tables.is_some() || icc.is_some() {
        jpeg::merge(&raw, level.jpeg_tables.as_deref(), icc.as_deref())?
    } else {
        let (w, h) = jpeg::decode_dimensions(&raw)?;
        (raw, w, h)
    };

    let (expected_width, expected_height) = expected_tile_size(level, x, y);
    if width == expected_width && height == expected_height {
        Ok(assembled)
    } else {
        crop_jpeg(&assembled, expected_width, expected_height)
    }
}

/// Decode a JPEG, crop to `(width, height)` anchored at the origin, and
/// re-encode as a standalone baseline JPEG.
fn crop_jpeg(data: &[u8], width: u32, height: u32) -> Result<Bytes, CoreError> {
    let decoded = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| CoreError::DecodeFailure(e.to_string()))?;
    let cropped = decoded.crop_imm(0, 0, width, height);
    encode_jpeg(&cropped)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Bytes, CoreError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, REENCODE_QUALITY)
        .encode_image(image)
        .map_err(|e| CoreError::EncodeFailure(e.to_string()))?;
    Ok(Bytes::from(out))
}

/// Re-compose a strip-organised level (or any extra image) from its strips
/// into one RGBA canvas and return it as a baseline JPEG.
async fn reassemble_strips<R: RangeReader>(
    reader: &R,
    pyramid: &Pyramid,
    level: &Level,
) -> Result<Bytes, CoreError> {
    let strip_count = level.strip_count();
    let mut canvas = RgbaImage::new(level.image_width.max(1), level.image_height.max(1));
    let icc = resolve_icc(level, pyramid);

    for s in 0..strip_count {
        let (offset, size) = level.strip_location(s)?;
        let raw = reader.read_exact_at(offset, size as usize).await?;

        let row_start = s * level.rows_per_strip;
        let strip_height = level
            .rows_per_strip
            .min(level.image_height.saturating_sub(row_start));

        match level.compression {
            compression::JPEG | compression::OLD_JPEG => {
                let merged = if level.jpeg_tables.is_some() || icc.is_some() {
                    jpeg::merge(&raw, level.jpeg_tables.as_deref(), icc.as_deref())?.0
                } else {
                    raw
                };
                let strip = ImageReader::with_format(Cursor::new(merged.as_ref()), ImageFormat::Jpeg)
                    .decode()
                    .map_err(|e| CoreError::DecodeFailure(e.to_string()))?
                    .to_rgba8();
                paint(&mut canvas, &strip, row_start);
            }
            compression::LZW => {
                let strip = decode_lzw_strip(&raw, level, level.image_width, strip_height)?;
                paint(&mut canvas, &strip, row_start);
            }
            other => return Err(CoreError::UnsupportedCompression(other)),
        }
    }

    encode_jpeg(&DynamicImage::ImageRgba8(canvas))
}

fn paint(canvas: &mut RgbaImage, strip: &RgbaImage, row_start: u32) {
    for (x, y, pixel) in strip.enumerate_pixels() {
        let canvas_y = row_start + y;
        if x < canvas.width() && canvas_y < canvas.height() {
            canvas.put_pixel(x, canvas_y, *pixel);
        }
    }
}

/// Decompress an LZW strip (MSB-first, 8-bit minimum code width) and
/// interpret it by photometric interpretation. Only `RGB` is implemented;
/// `YCbCr` and anything else fail with `UnsupportedPhotometric` before any
/// pixel is painted, per the corrected reading of the source's strip path.
fn decode_lzw_strip(
    raw: &[u8],
    level: &Level,
    width: u32,
    height: u32,
) -> Result<RgbaImage, CoreError> {
    if level.photometric != photometric::RGB {
        return Err(CoreError::UnsupportedPhotometric(level.photometric));
    }

    let mut decoder =
        weezl::decode::Configuration::with_tiff_size_switch(weezl::BitOrder::Msb, 8).build();
    let mut decompressed = decoder
        .decode(raw)
        .map_err(|e| CoreError::DecodeFailure(format!("LZW strip: {e}")))?;

    if level.predictor == predictor::HORIZONTAL_DIFFERENCING {
        undo_horizontal_predictor_rgb(&mut decompressed, width);
    }

    let expected_len = (width as usize) * (height as usize) * 3;
    if decompressed.len() < expected_len {
        return Err(CoreError::ShortRead {
            expected: expected_len,
            actual: decompressed.len(),
        });
    }

    let mut image = RgbaImage::new(width, height);
    for row in 0..height {
        for col in 0..width {
            let i = ((row * width + col) as usize) * 3;
            image.put_pixel(
                col,
                row,
                Rgba([decompressed[i], decompressed[i + 1], decompressed[i + 2], 255]),
            );
        }
    }
    Ok(image)
}

/// Undo horizontal differencing (predictor = 2): each pixel is the sum of
/// itself and the previous pixel in the same row, per channel. The running
/// sum resets at the start of every row.
fn undo_horizontal_predictor_rgb(data: &mut [u8], width: u32) {
    let stride = (width as usize) * 3;
    for row in data.chunks_mut(stride) {
        for i in 3..row.len() {
            row[i] = row[i].wrapping_add(row[i - 3]);
        }
    }
}

//! JPEG segment surgery: parsing a tile's byte stream into its marker
//! segments, merging in shared DQT/DHT tables and an ICC profile, and
//! re-emitting a standalone JPEG.
//!
//! TIFF's JPEG-in-tile convention often stores each tile as an abbreviated
//! stream — missing its quantization (DQT) and Huffman (DHT) tables, which
//! live once in the level's `JPEGTables` tag. [`merge`] splices them back in
//! without a decode/re-encode round trip.

use bytes::{Bytes, BytesMut};

use crate::error::CoreError;

/// One parsed marker segment, holding its bytes exactly as they appear on
/// the wire (`FF`, marker byte, then length + payload for data-bearing
/// markers, or length + entropy-coded data for SOS).
#[derive(Debug, Clone)]
pub struct Segment {
    pub marker: u8,
    pub data: Bytes,
}

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const DQT: u8 = 0xDB;
const DHT: u8 = 0xC4;
const DRI: u8 = 0xDD;
const SOS: u8 = 0xDA;
const COM: u8 = 0xFE;
const SOF_RANGE: std::ops::RangeInclusive<u8> = 0xC0..=0xC3;
const APPN_RANGE: std::ops::RangeInclusive<u8> = 0xE0..=0xEF;

fn is_sof(marker: u8) -> bool {
    SOF_RANGE.contains(&marker)
}

fn is_appn(marker: u8) -> bool {
    APPN_RANGE.contains(&marker)
}

/// Parse a JPEG byte stream into its marker segments (SOI/EOI consumed, not
/// returned as segments). Recognises APPn, DRI, DQT, DHT, SOF0-3, SOS, COM
/// (dropped); any other marker fails with `UnknownJpegSegment`.
pub fn parse(data: &[u8]) -> Result<Vec<Segment>, CoreError> {
    if data.len() < 4 {
        return Err(CoreError::BadJpeg("stream too short".into()));
    }
    if data[0] != 0xFF || data[1] != SOI {
        return Err(CoreError::BadJpeg("missing SOI".into()));
    }
    if data[data.len() - 2] != 0xFF || data[data.len() - 1] != EOI {
        return Err(CoreError::BadJpeg("missing EOI".into()));
    }

    let end = data.len() - 2;
    let mut pos = 2;
    let mut segments = Vec::new();

    while pos < end {
        if data[pos] != 0xFF {
            return Err(CoreError::BadJpeg(format!(
                "expected marker prefix 0xFF at offset {pos}"
            )));
        }
        let marker_start = pos;
        let marker = data[pos + 1];
        pos += 2;

        if marker == DQT || marker == DHT || marker == DRI || is_sof(marker) || is_appn(marker) {
            let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            let seg_end = pos + length;
            segments.push(Segment {
                marker,
                data: Bytes::copy_from_slice(&data[marker_start..seg_end]),
            });
            pos = seg_end;
        } else if marker == COM {
            let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            pos += length;
        } else if marker == SOS {
            segments.push(Segment {
                marker,
                data: Bytes::copy_from_slice(&data[marker_start..end]),
            });
            pos = end;
        } else {
            return Err(CoreError::UnknownJpegSegment(marker));
        }
    }

    Ok(segments)
}

/// Recover `(width, height)` from an SOF0-3 segment without decoding pixels.
/// Within the segment's on-wire bytes (marker included), height is at bytes
/// 5..7, width at bytes 7..9, both big-endian u16.
pub fn decode_sof(segment: &Segment) -> Result<(u32, u32), CoreError> {
    if !is_sof(segment.marker) {
        return Err(CoreError::BadJpeg(format!(
            "not an SOF segment: marker 0x{:02X}",
            segment.marker
        )));
    }
    if segment.data.len() < 9 {
        return Err(CoreError::BadJpeg("SOF segment too short".into()));
    }
    let height = u16::from_be_bytes([segment.data[5], segment.data[6]]) as u32;
    let width = u16::from_be_bytes([segment.data[7], segment.data[8]]) as u32;
    Ok((width, height))
}

/// Decode only the SOF segment's dimensions from a full JPEG stream, without
/// touching DQT/DHT/ICC. Used for tiles that need no table merging.
pub fn decode_dimensions(data: &[u8]) -> Result<(u32, u32), CoreError> {
    let segments = parse(data)?;
    let sof = segments
        .iter()
        .find(|s| is_sof(s.marker))
        .ok_or_else(|| CoreError::BadJpeg("no SOF segment".into()))?;
    decode_sof(sof)
}

/// Build a non-conformant `APP2` ICC segment matching the byte layout this
/// crate's reference slide format actually emits: marker, a 2-byte length
/// counting the length field and `"ICC_"` itself, the literal ASCII `"ICC_"`
/// (no `ICC_PROFILE\0` framing, no chunk sequence bytes), then the raw
/// profile. Returns `None` if the profile doesn't fit in one segment.
pub fn create_icc_segment(profile: &[u8]) -> Option<Bytes> {
    if profile.len() + 6 >= 65535 {
        return None;
    }
    let mut buf = BytesMut::with_capacity(4 + profile.len());
    buf.extend_from_slice(&[0xFF, 0xE2]);
    let length = (profile.len() + 4 + 2) as u16;
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(b"ICC_");
    buf.extend_from_slice(profile);
    Some(buf.freeze())
}

/// Merge a tile's JPEG bytes with an optional `JPEGTables` blob and an
/// optional ICC profile, producing a standalone JPEG. Tile DQT/DHT are kept
/// as-is; tables-sourced DQT/DHT are spliced in only when the tile has none
/// of its own. Tile APPn, SOF, and SOS always win. Returns the merged bytes
/// and the SOF-decoded `(width, height)`.
pub fn merge(
    tile: &[u8],
    jpeg_tables: Option<&[u8]>,
    icc_profile: Option<&[u8]>,
) -> Result<(Bytes, u32, u32), CoreError> {
    let tile_segments = parse(tile)?;

    let mut appn = Vec::new();
    let mut dqt: Vec<Segment> = Vec::new();
    let mut dht: Vec<Segment> = Vec::new();
    let mut sof = None;
    let mut sos = None;

    for seg in tile_segments {
        if is_appn(seg.marker) {
            appn.push(seg);
        } else if seg.marker == DQT {
            dqt.push(seg);
        } else if seg.marker == DHT {
            dht.push(seg);
        } else if seg.marker == DRI {
            // Recognised so the parser doesn't reject it as unknown, but
            // not re-emitted: the emit order has no DRI step.
        } else if is_sof(seg.marker) {
            sof.get_or_insert(seg);
        } else if seg.marker == SOS {
            sos.get_or_insert(seg);
        }
    }

    if dqt.is_empty() || dht.is_empty() {
        if let Some(tables) = jpeg_tables {
            let table_segments = parse(tables)?;
            if dqt.is_empty() {
                dqt.extend(table_segments.iter().filter(|s| s.marker == DQT).cloned());
            }
            if dht.is_empty() {
                dht.extend(table_segments.iter().filter(|s| s.marker == DHT).cloned());
            }
        }
    }

    let sof = sof.ok_or_else(|| CoreError::BadJpeg("tile has no SOF segment".into()))?;
    let sos = sos.ok_or_else(|| CoreError::BadJpeg("tile has no SOS segment".into()))?;
    let (width, height) = decode_sof(&sof)?;

    let icc_segment = icc_profile.and_then(create_icc_segment);

    let mut out = BytesMut::new();
    out.extend_from_slice(&[0xFF, SOI]);
    for seg in &appn {
        out.extend_from_slice(&seg.data);
    }
    if let Some(icc) = &icc_segment {
        out.extend_from_slice(icc);
    }
    for seg in &dqt {
        out.extend_from_slice(&seg.data);
    }
    for seg in &dht {
        out.extend_from_slice(&seg.data);
    }
    out.extend_from_slice(&sof.data);
    out.extend_from_slice(&sos.data);
    out.extend_from_slice(&[0xFF, EOI]);

    Ok((out.freeze(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sof0(width: u16, height: u16) -> Vec<u8> {
        let mut v = vec![0xFF, 0xC0, 0x00, 0x0B, 0x08];
        v.extend_from_slice(&height.to_be_bytes());
        v.extend_from_slice(&width.to_be_bytes());
        v.extend_from_slice(&[0x03]); // component count
        v
    }

    fn dqt_segment() -> Vec<u8> {
        vec![0xFF, DQT, 0x00, 0x05, 0x00, 0xAB]
    }

    fn dht_segment() -> Vec<u8> {
        vec![0xFF, DHT, 0x00, 0x05, 0x00, 0xCD]
    }

    fn sos_segment(entropy: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, SOS, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00];
        v.extend_from_slice(entropy);
        v
    }

    fn full_jpeg() -> Vec<u8> {
        let mut v = vec![0xFF, SOI];
        v.extend(dqt_segment());
        v.extend(dht_segment());
        v.extend(sof0(100, 80));
        v.extend(sos_segment(&[0x12, 0x34, 0x56]));
        v.extend_from_slice(&[0xFF, EOI]);
        v
    }

    fn abbreviated_tile() -> Vec<u8> {
        let mut v = vec![0xFF, SOI];
        v.extend(sof0(100, 80));
        v.extend(sos_segment(&[0x99, 0x88]));
        v.extend_from_slice(&[0xFF, EOI]);
        v
    }

    #[test]
    fn test_parse_full_stream() {
        let data = full_jpeg();
        let segments = parse(&data).unwrap();
        let markers: Vec<u8> = segments.iter().map(|s| s.marker).collect();
        assert_eq!(markers, vec![DQT, DHT, 0xC0, SOS]);
    }

    #[test]
    fn test_parse_unknown_marker_fails() {
        let mut data = vec![0xFF, SOI, 0xFF, 0x02, 0x00, 0x02];
        data.extend_from_slice(&[0xFF, EOI]);
        assert!(matches!(
            parse(&data),
            Err(CoreError::UnknownJpegSegment(0x02))
        ));
    }

    #[test]
    fn test_parse_missing_soi() {
        let data = vec![0x00, 0x00, 0xFF, EOI];
        assert!(matches!(parse(&data), Err(CoreError::BadJpeg(_))));
    }

    #[test]
    fn test_decode_sof() {
        let data = full_jpeg();
        let segments = parse(&data).unwrap();
        let sof = segments.iter().find(|s| s.marker == 0xC0).unwrap();
        assert_eq!(decode_sof(sof).unwrap(), (100, 80));
    }

    #[test]
    fn test_decode_dimensions_direct() {
        assert_eq!(decode_dimensions(&full_jpeg()).unwrap(), (100, 80));
    }

    #[test]
    fn test_merge_splices_missing_tables() {
        let tables = full_jpeg();
        let tile = abbreviated_tile();

        let (merged, width, height) = merge(&tile, Some(&tables), None).unwrap();
        assert_eq!((width, height), (100, 80));

        let segments = parse(&merged).unwrap();
        let markers: Vec<u8> = segments.iter().map(|s| s.marker).collect();
        assert_eq!(markers, vec![DQT, DHT, 0xC0, SOS]);
        // The tile's own SOS entropy data must win, not the tables'.
        let sos = segments.iter().find(|s| s.marker == SOS).unwrap();
        assert!(sos.data.ends_with(&[0x99, 0x88]));
    }

    #[test]
    fn test_merge_tile_tables_win_over_shared() {
        let tables = full_jpeg();
        // Tile already carries its own DQT/DHT/APPn; those must be kept.
        let mut tile = vec![0xFF, SOI];
        tile.extend(vec![0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB]); // APP0
        tile.extend(dqt_segment());
        tile.extend(dht_segment());
        tile.extend(sof0(50, 40));
        tile.extend(sos_segment(&[0x01]));
        tile.extend_from_slice(&[0xFF, EOI]);

        let (merged, width, height) = merge(&tile, Some(&tables), None).unwrap();
        assert_eq!((width, height), (50, 40));
        let segments = parse(&merged).unwrap();
        assert_eq!(segments.iter().filter(|s| s.marker == DQT).count(), 1);
        assert!(segments.iter().any(|s| s.marker == 0xE0));
    }

    #[test]
    fn test_merge_injects_icc_app2() {
        let tile = full_jpeg();
        let profile = b"fake-icc-profile-bytes";
        let (merged, _, _) = merge(&tile, None, Some(profile)).unwrap();

        assert_eq!(&merged[2..4], &[0xFF, 0xE2]);
        assert_eq!(&merged[8..12], b"ICC_");
        assert_eq!(&merged[12..12 + profile.len()], &profile[..]);
    }

    #[test]
    fn test_create_icc_segment_dropped_when_oversized() {
        let oversized = vec![0u8; 65530];
        assert!(create_icc_segment(&oversized).is_none());
    }

    #[test]
    fn test_create_icc_segment_length_field() {
        let profile = b"abc";
        let seg = create_icc_segment(profile).unwrap();
        let length = u16::from_be_bytes([seg[2], seg[3]]);
        assert_eq!(length as usize, profile.len() + 6);
    }

    #[test]
    fn test_merge_drops_dri() {
        let mut tile = vec![0xFF, SOI];
        tile.extend(dqt_segment());
        tile.extend(dht_segment());
        tile.extend(vec![0xFF, DRI, 0x00, 0x04, 0x00, 0x10]); // restart interval
        tile.extend(sof0(50, 40));
        tile.extend(sos_segment(&[0x01]));
        tile.extend_from_slice(&[0xFF, EOI]);

        let (merged, _, _) = merge(&tile, None, None).unwrap();
        let segments = parse(&merged).unwrap();
        assert!(!segments.iter().any(|s| s.marker == DRI));
    }

    #[test]
    fn test_merge_missing_sof_fails() {
        let mut tile = vec![0xFF, SOI];
        tile.extend(sos_segment(&[0x01]));
        tile.extend_from_slice(&[0xFF, EOI]);
        assert!(matches!(
            merge(&tile, None, None),
            Err(CoreError::BadJpeg(_))
        ));
    }
}

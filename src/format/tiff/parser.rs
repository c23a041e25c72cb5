//! TIFF/BigTIFF header parsing and the IFD linked-list walk.
//!
//! ## Header
//! Classic TIFF (8 bytes): bytes 0-1 byte order (`II`/`MM`), 2-3 version
//! (`0x002A`), 4-7 offset of the first IFD.
//! BigTIFF (16 bytes): bytes 0-1 byte order, 2-3 version (`0x002B`), 4-5
//! offset byte size (must be 8), 6-7 reserved, 8-15 offset of the first IFD.
//!
//! ## IFD
//! Each IFD is: an entry count (u16 classic / u64 BigTIFF), that many fixed
//! size entries (12 bytes classic / 20 bytes BigTIFF), then the offset of
//! the next IFD (0 terminates the chain).

use std::collections::HashMap;

use crate::error::CoreError;
use crate::io::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, BlockCache,
    RangeReader,
};

use super::tags::{fits_inline, FieldType};

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

pub const TIFF_HEADER_SIZE: usize = 8;
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Safety cap on the number of IFDs walked from one file. Not part of the
/// format; guards against a next-IFD-offset cycle in a malformed file.
const MAX_IFDS: usize = 1000;

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }
}

/// Parsed TIFF/BigTIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header from at least `TIFF_HEADER_SIZE` bytes (16 for
    /// BigTIFF support). Any signature/version mismatch, undersized buffer,
    /// wrong BigTIFF offset size, or out-of-range first-IFD offset fails
    /// with `BadHeader` / `UnsupportedOffsetSize`.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, CoreError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(CoreError::BadHeader(format!(
                "need at least {TIFF_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(CoreError::BadHeader(format!("invalid magic 0x{magic:04X}"))),
        };

        let version = byte_order.read_u16(&bytes[2..4]);

        match version {
            VERSION_TIFF => {
                let first_ifd_offset = byte_order.read_u32(&bytes[4..8]) as u64;
                if first_ifd_offset >= file_size {
                    return Err(CoreError::BadHeader(format!(
                        "first IFD offset {first_ifd_offset} outside file of size {file_size}"
                    )));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(CoreError::BadHeader(format!(
                        "need at least {BIGTIFF_HEADER_SIZE} bytes for BigTIFF, got {}",
                        bytes.len()
                    )));
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(CoreError::UnsupportedOffsetSize(offset_size));
                }
                let first_ifd_offset = byte_order.read_u64(&bytes[8..16]);
                if first_ifd_offset >= file_size {
                    return Err(CoreError::BadHeader(format!(
                        "first IFD offset {first_ifd_offset} outside file of size {file_size}"
                    )));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            _ => Err(CoreError::BadHeader(format!("invalid version {version}"))),
        }
    }

    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// IFD entries
// =============================================================================

/// One tag entry within an IFD, still holding its raw value/offset bytes
/// undecoded — decoding into a typed [`super::value::TagValue`] happens on
/// demand, since most tags in an IFD are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    pub field_type_raw: u16,
    pub field_type: Option<FieldType>,
    pub count: u64,
    /// Raw bytes of the value/offset field (4 bytes classic, 8 BigTIFF).
    pub value_offset_bytes: Vec<u8>,
    /// True if the value is stored inline in `value_offset_bytes` rather
    /// than at an external offset.
    pub is_inline: bool,
}

impl IfdEntry {
    /// Interpret `value_offset_bytes` as an absolute file offset (only
    /// meaningful when `!is_inline`).
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Total byte length of this entry's value array, if the type is known.
    pub fn total_value_bytes(&self) -> Option<usize> {
        let ft = self.field_type?;
        (self.count as usize).checked_mul(ft.size_in_bytes())
    }

    /// Decode a single inline BYTE/SBYTE/SHORT/LONG value without touching the file.
    /// Returns None for offset-stored entries or count != 1.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => Some(self.value_offset_bytes[0] as u32),
            FieldType::SByte => Some((self.value_offset_bytes[0] as i8) as i32 as u32),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Decode a single inline BYTE/SBYTE/SHORT/LONG/LONG8 value without
    /// touching the file. Returns None for offset-stored entries or count != 1.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => Some(self.value_offset_bytes[0] as u64),
            FieldType::SByte => Some((self.value_offset_bytes[0] as i8) as i64 as u64),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }
}

/// One Image File Directory: its tag table plus the offset of the next IFD
/// (0 if this is the last one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub entries_by_tag: HashMap<u16, usize>,
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Byte size of an IFD with `entry_count` entries (count field + entries
    /// + next-offset field), used to size a single read for the whole IFD.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Parse an IFD from exactly `calculate_size(entry_count, header)` bytes.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, CoreError> {
        let bo = header.byte_order;
        let count_size = header.ifd_count_size();
        let entry_count = if header.is_bigtiff {
            bo.read_u64(&bytes[0..count_size])
        } else {
            bo.read_u16(&bytes[0..count_size]) as u64
        };

        let entry_size = header.ifd_entry_size();
        let value_size = header.value_offset_size();
        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entries_by_tag = HashMap::with_capacity(entry_count as usize);

        let mut offset = count_size;
        for _ in 0..entry_count {
            let entry_bytes = &bytes[offset..offset + entry_size];
            let tag_id = bo.read_u16(&entry_bytes[0..2]);
            let field_type_raw = bo.read_u16(&entry_bytes[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);

            let count = if header.is_bigtiff {
                bo.read_u64(&entry_bytes[4..12])
            } else {
                bo.read_u32(&entry_bytes[4..8]) as u64
            };

            let value_offset_bytes = entry_bytes[entry_size - value_size..].to_vec();

            let is_inline = match field_type {
                Some(ft) => fits_inline(
                    (count as usize).saturating_mul(ft.size_in_bytes()),
                    header.is_bigtiff,
                ),
                // Unknown type: treat conservatively as out-of-line so the
                // accessor path surfaces UnknownType instead of silently
                // misreading the offset field as inline data.
                None => false,
            };

            let entry = IfdEntry {
                tag_id,
                field_type_raw,
                field_type,
                count,
                value_offset_bytes,
                is_inline,
            };

            // Duplicate tag id within one IFD: later entry wins.
            entries_by_tag.insert(tag_id, entries.len());
            entries.push(entry);
            offset += entry_size;
        }

        let next_ifd_offset = if header.is_bigtiff {
            bo.read_u64(&bytes[offset..offset + 8])
        } else {
            bo.read_u32(&bytes[offset..offset + 4]) as u64
        };

        Ok(Ifd {
            entries,
            entries_by_tag,
            next_ifd_offset,
        })
    }

    pub fn get_entry_by_tag(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries_by_tag.get(&tag).map(|&i| &self.entries[i])
    }
}

/// Walk the IFD linked list starting at the header's first IFD offset,
/// returning each IFD in file order along with the file offset it was read
/// from (useful for debugging/echoing). Reads go through the metadata block
/// cache, which is not yet flushed when this returns.
pub async fn walk_ifd_chain<R: RangeReader + 'static>(
    cache: &BlockCache<R>,
    header: &TiffHeader,
) -> Result<Vec<(u64, Ifd)>, CoreError> {
    let mut result = Vec::new();
    let mut offset = header.first_ifd_offset;
    let mut seen = std::collections::HashSet::new();

    while offset != 0 {
        if !seen.insert(offset) || result.len() >= MAX_IFDS {
            break;
        }

        let count_size = header.ifd_count_size();
        let count_bytes = cache.read_block(offset, count_size).await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let ifd_size = Ifd::calculate_size(entry_count, header);
        let ifd_bytes = cache.read_block(offset, ifd_size).await?;
        let ifd = Ifd::parse(&ifd_bytes, header)?;

        let next = ifd.next_ifd_offset;
        result.push((offset, ifd));
        offset = next;
    }

    Ok(result)
}

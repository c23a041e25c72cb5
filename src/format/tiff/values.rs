//! TIFF tag value reading — inline or offset-stored, widened to u32/u64.

use bytes::Bytes;

use crate::error::CoreError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads tag values respecting a TIFF file's byte order, fetching
/// offset-stored values from `reader` as needed.
pub struct ValueReader<'a, R> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes backing an entry's value, inline or fetched by offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, CoreError> {
        let size = entry
            .total_value_bytes()
            .ok_or(CoreError::UnknownType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(&entry.value_offset_bytes[..size]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size).await?)
        }
    }

    /// A single u32 value, widening from BYTE, SBYTE, SHORT, or LONG. A tagged value of
    /// any other type widens to 0, per the crate's "never fail on a
    /// surprising but harmless tag type" policy.
    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, CoreError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }
        let Some(field_type) = entry.field_type else {
            return Ok(0);
        };
        if entry.count != 1 {
            return Ok(0);
        }
        let bytes = self.read_bytes(entry).await?;
        let bo = self.header.byte_order;
        Ok(match field_type {
            FieldType::Byte => bytes[0] as u32,
            FieldType::SByte => (bytes[0] as i8) as i32 as u32,
            FieldType::Short => bo.read_u16(&bytes) as u32,
            FieldType::Long => bo.read_u32(&bytes),
            _ => 0,
        })
    }

    /// A single u64 value, widening from BYTE, SBYTE, SHORT, LONG, or LONG8.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, CoreError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        let Some(field_type) = entry.field_type else {
            return Ok(0);
        };
        if entry.count != 1 {
            return Ok(0);
        }
        let bytes = self.read_bytes(entry).await?;
        let bo = self.header.byte_order;
        Ok(match field_type {
            FieldType::Byte => bytes[0] as u64,
            FieldType::SByte => (bytes[0] as i8) as i64 as u64,
            FieldType::Short => bo.read_u16(&bytes) as u64,
            FieldType::Long => bo.read_u32(&bytes) as u64,
            FieldType::Long8 => bo.read_u64(&bytes),
            _ => 0,
        })
    }

    /// An array of u64 values — the primary accessor for TileOffsets,
    /// TileByteCounts, StripOffsets, StripByteCounts. The whole array is
    /// fetched in one range request.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, CoreError> {
        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let Some(field_type) = entry.field_type else {
            return Ok(vec![0; count]);
        };

        let bytes = self.read_bytes(entry).await?;
        let bo = self.header.byte_order;
        let mut values = Vec::with_capacity(count);

        match field_type {
            FieldType::Byte => {
                for i in 0..count {
                    values.push(bytes[i] as u64);
                }
            }
            FieldType::SByte => {
                for i in 0..count {
                    values.push((bytes[i] as i8) as i64 as u64);
                }
            }
            FieldType::Short => {
                for i in 0..count {
                    values.push(bo.read_u16(&bytes[i * 2..]) as u64);
                }
            }
            FieldType::Long => {
                for i in 0..count {
                    values.push(bo.read_u32(&bytes[i * 4..]) as u64);
                }
            }
            FieldType::Long8 => {
                for i in 0..count {
                    values.push(bo.read_u64(&bytes[i * 8..]));
                }
            }
            _ => values.extend(std::iter::repeat(0).take(count)),
        }

        Ok(values)
    }

    /// An array of u32 values — used for tile dimensions and similar.
    pub async fn read_u32_array(&self, entry: &IfdEntry) -> Result<Vec<u32>, CoreError> {
        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let Some(field_type) = entry.field_type else {
            return Ok(vec![0; count]);
        };

        let bytes = self.read_bytes(entry).await?;
        let bo = self.header.byte_order;
        let mut values = Vec::with_capacity(count);

        match field_type {
            FieldType::Byte => {
                for i in 0..count {
                    values.push(bytes[i] as u32);
                }
            }
            FieldType::SByte => {
                for i in 0..count {
                    values.push((bytes[i] as i8) as i32 as u32);
                }
            }
            FieldType::Short => {
                for i in 0..count {
                    values.push(bo.read_u16(&bytes[i * 2..]) as u32);
                }
            }
            FieldType::Long => {
                for i in 0..count {
                    values.push(bo.read_u32(&bytes[i * 4..]));
                }
            }
            _ => values.extend(std::iter::repeat(0).take(count)),
        }

        Ok(values)
    }

    /// An ASCII value, null terminator stripped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, CoreError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Raw bytes for opaque/UNDEFINED data (JPEGTables, ICC profiles).
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, CoreError> {
        self.read_bytes(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use async_trait::async_trait;

    struct MockReader {
        data: Vec<u8>,
    }

    impl MockReader {
        fn new(data: Vec<u8>) -> Self {
            Self { data }
        }
    }

    #[async_trait]
    impl RangeReader for MockReader {
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
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }

        fn identifier(&self) -> &str {
            "mock://test"
        }
    }

    fn make_header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    #[tokio::test]
    async fn test_read_bytes_inline() {
        let reader = MockReader::new(vec![0; 100]);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: Some(FieldType::Short),
            field_type_raw: 3,
            count: 1,
            value_offset_bytes: vec![0x00, 0x04, 0x00, 0x00],
            is_inline: true,
        };

        let bytes = vr.read_bytes(&entry).await.unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x04]);
    }

    #[tokio::test]
    async fn test_read_bytes_offset() {
        let mut data = vec![0u8; 100];
        data[50..54].copy_from_slice(&[0xAB, 0xCD, 0xEF, 0x12]);
        let reader = MockReader::new(data);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 1,
            value_offset_bytes: vec![0x32, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let bytes = vr.read_bytes(&entry).await.unwrap();
        assert_eq!(&bytes[..], &[0xAB, 0xCD, 0xEF, 0x12]);
    }

    #[tokio::test]
    async fn test_read_u64_array() {
        let mut data = vec![0u8; 200];
        for (i, &val) in [1000u32, 2000, 3000, 4000, 5000].iter().enumerate() {
            data[100 + i * 4..104 + i * 4].copy_from_slice(&val.to_le_bytes());
        }
        let reader = MockReader::new(data);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 324,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 5,
            value_offset_bytes: vec![0x64, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let result = vr.read_u64_array(&entry).await.unwrap();
        assert_eq!(result, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[tokio::test]
    async fn test_read_string() {
        let mut data = vec![0u8; 100];
        let desc = b"Generic pyramidal TIFF\0";
        data[20..20 + desc.len()].copy_from_slice(desc);
        let reader = MockReader::new(data);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 270,
            field_type: Some(FieldType::Ascii),
            field_type_raw: 2,
            count: desc.len() as u64,
            value_offset_bytes: vec![0x14, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        assert_eq!(
            vr.read_string(&entry).await.unwrap(),
            "Generic pyramidal TIFF"
        );
    }

    #[tokio::test]
    async fn test_read_u32_widens_byte() {
        let reader = MockReader::new(vec![0; 100]);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 254,
            field_type: Some(FieldType::Byte),
            field_type_raw: 1,
            count: 1,
            value_offset_bytes: vec![200, 0, 0, 0],
            is_inline: true,
        };

        assert_eq!(vr.read_u32(&entry).await.unwrap(), 200);
        assert_eq!(vr.read_u64(&entry).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_read_u32_widens_sbyte() {
        let reader = MockReader::new(vec![0; 100]);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        // -2 as an i8 bit pattern is 0xFE; sign-extended it is u32::MAX - 1.
        let entry = IfdEntry {
            tag_id: 254,
            field_type: Some(FieldType::SByte),
            field_type_raw: 6,
            count: 1,
            value_offset_bytes: vec![0xFE, 0, 0, 0],
            is_inline: true,
        };

        assert_eq!(vr.read_u32(&entry).await.unwrap(), u32::MAX - 1);
        assert_eq!(vr.read_u64(&entry).await.unwrap(), u64::MAX - 1);
    }

    #[tokio::test]
    async fn test_read_u32_array_widens_byte_and_sbyte() {
        let mut data = vec![0u8; 100];
        data[40..44].copy_from_slice(&[10, 20, 0xFE, 0xFF]); // 10, 20, -2, -1
        let reader = MockReader::new(data);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let unsigned_entry = IfdEntry {
            tag_id: 254,
            field_type: Some(FieldType::Byte),
            field_type_raw: 1,
            count: 4,
            value_offset_bytes: vec![0x28, 0x00, 0x00, 0x00],
            is_inline: false,
        };
        assert_eq!(
            vr.read_u32_array(&unsigned_entry).await.unwrap(),
            vec![10, 20, 254, 255]
        );

        let signed_entry = IfdEntry {
            field_type: Some(FieldType::SByte),
            field_type_raw: 6,
            ..unsigned_entry
        };
        assert_eq!(
            vr.read_u32_array(&signed_entry).await.unwrap(),
            vec![10, 20, (-2i32) as u32, (-1i32) as u32]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_widens_to_zero() {
        let reader = MockReader::new(vec![0; 100]);
        let header = make_header();
        let vr = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: None,
            field_type_raw: 99,
            count: 1,
            value_offset_bytes: vec![0, 0, 0, 0],
            is_inline: false,
        };

        assert_eq!(vr.read_u32(&entry).await.unwrap(), 0);
        assert_eq!(vr.read_u64(&entry).await.unwrap(), 0);
    }
}

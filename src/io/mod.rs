//! Byte-range source abstraction and the metadata-parsing block cache.
//!
//! [`RangeReader`] is the polymorphic capability this whole crate is built
//! on: open by name, close, random read of N bytes at an absolute offset.
//! [`local_reader::LocalRangeReader`] is the mandatory local-file backing;
//! the `s3` feature adds [`s3_reader::S3RangeReader`] as an alternate
//! implementation of the same interface.

mod block_cache;
mod local_reader;
mod range_reader;
#[cfg(feature = "s3")]
mod s3_reader;

pub use block_cache::BlockCache;
pub use local_reader::{LocalRangeReader, LocalSlideSource};
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
#[cfg(feature = "s3")]
pub use s3_reader::{create_s3_client, S3RangeReader};

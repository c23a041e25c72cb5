//! Slide abstraction layer.
//!
//! A [`Slide`] is one open image file: a byte-range source plus the
//! [`Pyramid`](crate::format::tiff::Pyramid) parsed from it. [`assembler`]
//! turns pyramid metadata and raw tile/strip bytes into self-contained
//! JPEGs; [`SlideRegistry`] is the bounded, concurrency-safe cache of
//! opened slides that every request goes through.

mod assembler;
mod local_source;
mod reader;
mod registry;
#[cfg(feature = "s3")]
mod s3_source;

pub use local_source::LocalFileSlideSource;
pub use reader::{LevelMetadata, PyramidMetadata, Slide};
pub use registry::{SlideRegistry, SlideSource, DEFAULT_SLIDE_CACHE_CAPACITY};
#[cfg(feature = "s3")]
pub use s3_source::S3SlideSource;

//! Pyramidal whole-slide-image tile reader.
//!
//! Reads tiles and non-pyramid images directly out of TIFF/BigTIFF
//! whole-slide-image containers via byte-range reads, without downloading
//! the whole file. Works for any vendor whose pyramidal layout reduces to
//! a TIFF IFD chain (Aperio SVS included) — there is no vendor-specific
//! parser, only a TIFF/BigTIFF path plus JPEG segment surgery to make
//! individual tiles standalone.
//!
//! ## Architecture
//!
//! - [`io`] - byte-range source abstraction (local file, optional S3) and the block cache
//! - [`mod@format`] - TIFF/BigTIFF parsing, pyramid classification, JPEG segment surgery
//! - [`slide`] - [`slide::Slide`] (one open file) and [`slide::SlideRegistry`] (the reader cache)
//! - [`server`] - thin Axum HTTP surface
//! - [`config`] - CLI/env configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_slide_reader::slide::{LocalFileSlideSource, SlideRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = LocalFileSlideSource::new("assets");
//!     let registry = SlideRegistry::new(source);
//!
//!     let metadata = registry.open_slide("sample.tif").await.unwrap();
//!     println!("levels: {}", metadata.levels.len());
//!
//!     let slide = registry.get_slide("sample.tif").await.unwrap();
//!     let _tile = slide.get_tile(0, 0, 0).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod server;
pub mod slide;

pub use config::Config;
pub use error::{CoreError, IoError};
pub use slide::{
    LevelMetadata, LocalFileSlideSource, PyramidMetadata, Slide, SlideRegistry, SlideSource,
};
#[cfg(feature = "s3")]
pub use slide::S3SlideSource;

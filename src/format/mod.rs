//! Format parsers for Whole Slide Image files.
//!
//! Every vendor's pyramidal slide — Aperio SVS, generic pyramidal TIFF,
//! BigTIFF — is read through the same TIFF/BigTIFF path in [`tiff`]; there is
//! no vendor-specific reader. [`jpeg`] handles the segment-level surgery
//! needed to turn a tile's possibly-abbreviated JPEG stream into a
//! standalone one.

pub mod jpeg;
pub mod tiff;

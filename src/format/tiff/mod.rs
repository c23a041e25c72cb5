//! TIFF/BigTIFF parsing for whole-slide images.
//!
//! - **Byte order**: declared in the header (`II` little-endian, `MM`
//!   big-endian); every multi-byte field thereafter respects it.
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets and counts,
//!   handled transparently past the header.
//! - **IFD (Image File Directory)**: a tag table plus a pointer to the next
//!   IFD. A slide's IFD chain mixes pyramid levels with label/macro/
//!   thumbnail images; [`pyramid::classify`] separates them.
//! - **Inline vs offset values**: small values live in the IFD entry itself;
//!   larger ones are stored at an offset the entry points to.

pub mod parser;
pub mod pyramid;
pub mod tags;
pub mod values;

pub use parser::{
    walk_ifd_chain, ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use pyramid::{classify, ExtraImage, Level, Pyramid};
pub use tags::{compression, photometric, predictor, tag_id, FieldType};
pub use values::ValueReader;

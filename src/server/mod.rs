//! Thin HTTP surface over the tile reader core.
//!
//! Exposes exactly the three operations named in the external-interfaces
//! contract — slide metadata, tile fetch, extra-image fetch — as Axum
//! routes. No auth layer, no viewer: this exists so the crate is runnable
//! end to end, not where the engineering effort goes.

pub mod handlers;
pub mod routes;

pub use handlers::{
    extra_image_handler, health_handler, slide_metadata_handler, tile_handler, AppState,
    ErrorResponse, ExtraImagePathParams, HealthResponse, SlidePathParams, TilePathParams,
};
pub use routes::{create_router, RouterConfig};

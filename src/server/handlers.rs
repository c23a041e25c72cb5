//! HTTP request handlers for the tile API.
//!
//! - `GET /slides/{slide_id}` - slide metadata (ensures the slide is parsed and cached)
//! - `GET /tiles/{slide_id}/{level}/{x}/{y}.jpg` - a single tile
//! - `GET /slides/{slide_id}/extra/{index}` - a non-pyramid image (label, macro, thumbnail)
//! - `GET /health` - health check

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::slide::{SlideRegistry, SlideSource};

/// Shared application state handed to every handler via Axum's `State` extractor.
pub struct AppState<S: SlideSource> {
    pub registry: Arc<SlideRegistry<S>>,
}

impl<S: SlideSource> AppState<S> {
    pub fn new(registry: SlideRegistry<S>) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlidePathParams {
    pub slide_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub slide_id: String,
    pub level: usize,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExtraImagePathParams {
    pub slide_id: String,
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Maps a [`CoreError`] to an HTTP response, per spec: "the HTTP collaborator
/// maps all core errors to 4xx/5xx; exact codes are a boundary concern".
pub struct HandlerError(pub CoreError);

impl From<CoreError> for HandlerError {
    fn from(err: CoreError) -> Self {
        HandlerError(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            CoreError::TagNotFound(_) | CoreError::IndexOutOfRange { .. } => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            CoreError::UnsupportedCompression(_) | CoreError::UnsupportedPhotometric(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            CoreError::BadHeader(_)
            | CoreError::UnsupportedOffsetSize(_)
            | CoreError::UnknownType(_)
            | CoreError::BadJpeg(_)
            | CoreError::UnknownJpegSegment(_) => (StatusCode::UNPROCESSABLE_ENTITY, "bad_slide"),
            CoreError::Io(io_err) => match io_err {
                crate::error::IoError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            },
            CoreError::ShortRead { .. }
            | CoreError::DecodeFailure(_)
            | CoreError::EncodeFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse::new(error_type, self.0.to_string());
        (status, Json(body)).into_response()
    }
}

pub async fn slide_metadata_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<SlidePathParams>,
) -> Result<Response, HandlerError> {
    let metadata = state.registry.open_slide(&params.slide_id).await?;
    Ok(Json(metadata).into_response())
}

pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError> {
    let slide = state.registry.get_slide(&params.slide_id).await?;
    let tile = slide.get_tile(params.level, params.x, params.y).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(axum::body::Body::from(tile))
        .unwrap())
}

pub async fn extra_image_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<ExtraImagePathParams>,
) -> Result<Response, HandlerError> {
    let slide = state.registry.get_slide(&params.slide_id).await?;
    let image = slide.get_extra_image(params.index).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(axum::body::Body::from(image))
        .unwrap())
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

//! Router construction for the tile API.
//!
//! ```text
//! GET /health                                       - health check
//! GET /slides/{slide_id}                            - PyramidMetadata (ensures parsed+cached)
//! GET /tiles/{slide_id}/{level}/{x}/{y}.jpg          - a tile
//! GET /slides/{slide_id}/extra/{index}               - a non-pyramid image
//! ```

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    extra_image_handler, health_handler, slide_metadata_handler, tile_handler, AppState,
};
use crate::slide::{SlideRegistry, SlideSource};

/// Router configuration.
#[derive(Clone)]
pub struct RouterConfig {
    pub cors_origins: Option<Vec<String>>,
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

/// Build the application router over a [`SlideRegistry`].
pub fn create_router<S>(registry: SlideRegistry<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let app_state = AppState::new(registry);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/slides/{slide_id}", get(slide_metadata_handler::<S>))
        .route(
            "/slides/{slide_id}/extra/{index}",
            get(extra_image_handler::<S>),
        )
        .route(
            "/tiles/{slide_id}/{level}/{x}/{y}",
            get(tile_handler::<S>),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::HEAD])
        .allow_headers([http::header::CONTENT_TYPE]);

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_config_defaults() {
        let config = RouterConfig::new();
        assert!(config.cors_origins.is_none());
        assert!(config.enable_tracing);
    }

    #[test]
    fn test_router_config_builder() {
        let config = RouterConfig::new()
            .with_cors_origins(vec!["https://example.com".to_string()])
            .with_tracing(false);
        assert_eq!(
            config.cors_origins,
            Some(vec!["https://example.com".to_string()])
        );
        assert!(!config.enable_tracing);
    }

    #[test]
    fn test_build_cors_layer_any_origin() {
        let config = RouterConfig::new();
        let _cors = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let config = RouterConfig::new().with_cors_origins(vec!["https://example.com".to_string()]);
        let _cors = build_cors_layer(&config);
    }
}

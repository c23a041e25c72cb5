//! Tile reader server entrypoint.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_slide_reader::{
    config::Config,
    server::{create_router, RouterConfig},
    slide::{LocalFileSlideSource, SlideRegistry},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("assets directory: {}", config.assets_directory.display());
    info!("reader cache size: {}", config.cache_size);

    let source = LocalFileSlideSource::new(config.assets_directory.clone());
    let registry = SlideRegistry::with_capacity(source, config.cache_size);

    let router = create_router(registry, RouterConfig::new());

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "wsi_slide_reader=debug,tower_http=debug"
    } else {
        "wsi_slide_reader=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

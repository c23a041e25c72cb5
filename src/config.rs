//! Configuration management for the tile reader.
//!
//! Supports command-line arguments via clap and environment variables with
//! the `WSI_` prefix, with sensible defaults for everything.

use std::path::PathBuf;

use clap::Parser;

use crate::slide::DEFAULT_SLIDE_CACHE_CAPACITY;

/// Default root directory for file-backed slides.
pub const DEFAULT_ASSETS_DIRECTORY: &str = "assets";

/// Default server bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Tile reader configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-slide-reader")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Root directory for file-backed slides.
    #[arg(long, default_value = DEFAULT_ASSETS_DIRECTORY, env = "WSI_ASSETS_DIRECTORY")]
    pub assets_directory: PathBuf,

    /// Maximum number of open slides kept in the reader cache.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "WSI_CACHE_SIZE")]
    pub cache_size: usize,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WSI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WSI_PORT")]
    pub port: u16,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            assets_directory: PathBuf::from("assets"),
            cache_size: 100,
            host: "127.0.0.1".to_string(),
            port: 8080,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_cache_size() {
        let mut config = test_config();
        config.cache_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        let config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }
}

//! Configuration management

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::defaults;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Directory for staged CSV uploads
    pub storage_dir: PathBuf,

    /// Directory for queued background imports
    pub queue_dir: PathBuf,

    /// Rows per batch unless the request overrides it
    pub import_page_size: i64,

    /// IP geolocation endpoint (optional, lookups disabled when unset)
    pub ip_location_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let storage_dir = std::env::var("IMPORT_STORAGE_DIR")
            .unwrap_or_else(|_| defaults::DEFAULT_STORAGE_DIR.to_string())
            .into();

        let queue_dir = std::env::var("IMPORT_QUEUE_DIR")
            .unwrap_or_else(|_| defaults::DEFAULT_QUEUE_DIR.to_string())
            .into();

        let import_page_size = match std::env::var("IMPORT_PAGE_SIZE") {
            Ok(value) => value
                .parse::<i64>()
                .with_context(|| format!("IMPORT_PAGE_SIZE must be a number, got {:?}", value))?,
            Err(_) => defaults::DEFAULT_IMPORT_PAGE_SIZE,
        };
        if import_page_size < 1 {
            anyhow::bail!(
                "IMPORT_PAGE_SIZE must be at least 1 (current: {})",
                import_page_size
            );
        }

        let ip_location_url = std::env::var("IP_LOCATION_URL").ok().filter(|url| !url.is_empty());

        Ok(Self {
            nats_url,
            database_url,
            storage_dir,
            queue_dir,
            import_page_size,
            ip_location_url,
        })
    }
}

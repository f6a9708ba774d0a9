use crate::error::{Result, WeatherError};
use std::time::Duration;

/// Runtime configuration, loaded once at startup from `.env` files and the
/// process environment. Pipeline code never touches the environment directly;
/// everything it needs is threaded through this struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub region: String,
    pub bucket: String,
    pub maps_api_key: String,
    pub access_token: String,
    pub db_path: String,
    pub port: u16,
    /// Base URL under which bucket objects are publicly reachable.
    pub public_storage_base: String,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub video_deadline: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try loading .env files from various locations (root, parent, etc)
        let _ = dotenv::from_filename(".env");
        let _ = dotenv::from_filename("../.env");

        let cfg = Config {
            project_id: env_or(
                "GOOGLE_CLOUD_PROJECT",
                &std::env::var("PROJECT_ID").unwrap_or_default(),
            ),
            region: env_or("GOOGLE_CLOUD_LOCATION", "us-central1"),
            bucket: std::env::var("GENMEDIA_BUCKET").unwrap_or_default(),
            maps_api_key: std::env::var("GOOGLE_MAPS_API_KEY").unwrap_or_default(),
            access_token: std::env::var("GOOGLE_OAUTH_TOKEN").unwrap_or_default(),
            db_path: env_or("WEATHERCAST_DB", "data/weathercast.db"),
            port: env_or("PORT", "8080")
                .parse()
                .map_err(|e| WeatherError::Config(format!("invalid PORT: {e}")))?,
            public_storage_base: env_or("PUBLIC_STORAGE_BASE", "https://storage.googleapis.com"),
            cache_ttl: Duration::from_secs(3 * 60 * 60),
            poll_interval: Duration::from_secs(5),
            video_deadline: Duration::from_secs(env_or("VIDEO_DEADLINE_SECS", "300").parse().unwrap_or(300)),
        };

        if cfg.project_id.is_empty() {
            return Err(WeatherError::Config(
                "GOOGLE_CLOUD_PROJECT or PROJECT_ID is required".into(),
            ));
        }
        if cfg.bucket.is_empty() {
            return Err(WeatherError::Config("GENMEDIA_BUCKET is required".into()));
        }
        if cfg.maps_api_key.is_empty() {
            return Err(WeatherError::Config("GOOGLE_MAPS_API_KEY is required".into()));
        }

        Ok(cfg)
    }
}

fn env_or(key: &str, default_val: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default_val.to_string(),
    }
}

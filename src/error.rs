use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("location resolution failed: {0}")]
    Resolution(String),

    #[error("image generation failed: {0}")]
    Generation(String),

    #[error("artifact upload failed: {0}")]
    Upload(String),

    #[error("video generation failed: {message}")]
    Video { message: String },

    #[error("video generation cancelled: {0}")]
    Cancelled(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, WeatherError>;

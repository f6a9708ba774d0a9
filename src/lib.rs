pub mod config;
pub mod error;
pub mod events;
pub mod gcs;
pub mod genai;
pub mod logging;
pub mod maps;
pub mod orchestrator;
pub mod server;
pub mod store;
pub mod tasks;
pub mod types;

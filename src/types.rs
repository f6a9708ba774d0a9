use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted record per resolved place. Field names are the wire and
/// storage contract shared with the frontend and admin tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub city_query: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub video_url: String,
    pub is_preset: bool,
    pub last_updated: DateTime<Utc>,
}

/// Result of resolving a free-text city query.
#[derive(Debug, Clone)]
pub struct ResolvedCity {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Prompt template selector for image generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleMode {
    /// Fresh unweighted coin flip between Landmark and Drink, per call.
    Random,
    /// Landmark-centric isometric scene.
    Landmark,
    /// Drink-cup framing device.
    Drink,
}

impl StyleMode {
    /// Maps the wire/CLI value (0/1/2). Unknown values fall back to Random,
    /// matching the lenient behavior callers depend on.
    pub fn from_wire(v: i64) -> Self {
        match v {
            1 => StyleMode::Landmark,
            2 => StyleMode::Drink,
            _ => StyleMode::Random,
        }
    }
}

/// A stored artifact: internal reference plus the public URL it serves from.
#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub uri: String,
    pub public_url: String,
}

/// Handle for a long-running video operation.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub name: String,
}

/// One poll observation of a long-running video operation.
#[derive(Debug, Clone)]
pub enum PollStatus {
    Pending,
    /// Operation finished; carries the raw operation document. The driver
    /// applies error checks and tolerant URI extraction because the response
    /// schema is not contractually stable.
    Done(serde_json::Value),
}

/// Resolves coordinates or free-text queries into a canonical display name.
#[async_trait::async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve_coordinates(&self, lat: f64, lng: f64) -> Result<String>;
    async fn resolve_query(&self, query: &str) -> Result<ResolvedCity>;
}

/// Produces a raster image artifact for a location prompt.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns PNG bytes. `extra_context`, if non-empty, is appended verbatim
    /// as a free-text hint (used for fictional settings).
    async fn generate(&self, city: &str, extra_context: &str, style: StyleMode) -> Result<Vec<u8>>;
}

/// Persists a binary artifact and exposes it publicly.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<UploadedObject>;
}

/// Submits asynchronous animation jobs and answers status queries.
/// Completion is driven by the orchestrator's polling loop.
#[async_trait::async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn submit(&self, input_image_uri: &str, prompt: &str) -> Result<OperationHandle>;
    async fn poll(&self, handle: &OperationHandle) -> Result<PollStatus>;
}

/// Derives the deterministic record id from a canonical display name.
/// Lowercase; every character outside `[a-z0-9]` becomes `_`.
pub fn sanitize_id(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_id_is_deterministic_across_case() {
        assert_eq!(sanitize_id("San Francisco, CA"), sanitize_id("san francisco, ca"));
        assert_eq!(sanitize_id("San Francisco, CA"), "san_francisco__ca");
    }

    #[test]
    fn sanitize_id_replaces_non_alphanumerics() {
        assert_eq!(sanitize_id("Tōkyō"), "t_ky_");
        assert_eq!(sanitize_id("Paris"), "paris");
        assert_eq!(sanitize_id("A1 b2!"), "a1_b2_");
    }

    #[test]
    fn style_mode_wire_mapping() {
        assert_eq!(StyleMode::from_wire(0), StyleMode::Random);
        assert_eq!(StyleMode::from_wire(1), StyleMode::Landmark);
        assert_eq!(StyleMode::from_wire(2), StyleMode::Drink);
        assert_eq!(StyleMode::from_wire(7), StyleMode::Random);
    }
}

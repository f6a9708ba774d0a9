use crate::error::{Result, WeatherError};
use crate::events::{EventSink, WeatherCard};
use crate::genai::extract_video_uri;
use crate::store::MetadataStore;
use crate::types::{
    sanitize_id, ImageGenerator, Location, LocationResolver, ObjectStore, OperationHandle,
    PollStatus, StyleMode, VideoGenerator,
};
use base64::Engine as _;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Pipeline tuning and the values that must not be read from the environment
/// mid-flow (notably the public storage URL base).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub video_deadline: Duration,
    pub public_storage_base: String,
    pub default_city: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3 * 60 * 60),
            poll_interval: Duration::from_secs(5),
            video_deadline: Duration::from_secs(300),
            public_storage_base: "https://storage.googleapis.com".to_string(),
            default_city: "San Francisco".to_string(),
        }
    }
}

/// Raw caller input for one weather job: free text or coordinates.
#[derive(Debug, Clone, Default)]
pub struct WeatherRequest {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Input for a curated preset record.
#[derive(Debug, Clone)]
pub struct PresetSpec {
    pub id: String,
    pub name: String,
    pub city: String,
    pub category: String,
    pub context: String,
    pub style: StyleMode,
}

/// Sequences resolution, cache, generation, upload, and video into one
/// pipeline per request. Owns no long-lived state; each invocation is an
/// independent run over the injected collaborators.
pub struct Orchestrator {
    resolver: Arc<dyn LocationResolver>,
    images: Arc<dyn ImageGenerator>,
    videos: Arc<dyn VideoGenerator>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn MetadataStore>,
    cfg: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<dyn LocationResolver>,
        images: Arc<dyn ImageGenerator>,
        videos: Arc<dyn VideoGenerator>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn MetadataStore>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            images,
            videos,
            objects,
            store,
            cfg,
        }
    }

    /// The interactive flow: resolve, serve from cache when fresh, otherwise
    /// generate an image (streamed to the caller immediately) and then a
    /// video. Upload and video failures are soft; the job still succeeds once
    /// the caller has the image.
    #[instrument(skip(self, sink, cancel))]
    pub async fn run_weather_flow(
        &self,
        req: WeatherRequest,
        sink: &EventSink,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!("Weather flow started. City: {:?}, Lat: {:?}, Lng: {:?}", req.city, req.lat, req.lng);
        sink.status("Identifying location...");

        // 1. Resolve location
        let city = match self.resolve(&req).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Location resolution failed: {}", e);
                sink.error(format!("Failed to resolve location: {e}"));
                return Err(e);
            }
        };
        info!("Resolved location to: {}", city);
        sink.status(format!("Found location: {city}"));

        // 2. Cache check
        let id = sanitize_id(&city);
        let cached = self.store.get(&id).await.unwrap_or_else(|e| {
            warn!("Cache lookup failed for {}: {}", id, e);
            None
        });
        if let Some(loc) = cached {
            let age = Utc::now().signed_duration_since(loc.last_updated);
            if age.to_std().map(|a| a < self.cfg.cache_ttl).unwrap_or(false) {
                info!("Cache hit for {}", city);
                sink.status("Loading cached forecast...");
                sink.result(WeatherCard {
                    city,
                    image_base64: None,
                    image_url: Some(loc.image_url),
                    last_updated: loc.last_updated,
                });
                if !loc.video_url.is_empty() {
                    sink.video(loc.video_url);
                }
                return Ok(());
            }
            debug!("Cache entry for {} is stale ({}s old)", id, age.num_seconds());
        }

        // 3. Generate image. The web flow always uses the random style.
        sink.status(format!("Painting the forecast for {city}..."));
        let image_bytes = match self.images.generate(&city, "", StyleMode::Random).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Image generation failed for '{}': {}", city, e);
                sink.error(format!("Failed to generate image: {e}"));
                return Err(e);
            }
        };
        info!("Successfully generated image for: {}", city);

        // 4. The caller gets usable image content before the slower video stage.
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);
        sink.result(WeatherCard {
            city: city.clone(),
            image_base64: Some(image_base64),
            image_url: None,
            last_updated: Utc::now(),
        });

        // 5. Upload. Failure is soft: the caller already has the image, so we
        // only log and end the job successfully.
        sink.status("Preparing for animation...");
        let file_name = format!("image_{}.png", Utc::now().timestamp_micros());
        let uploaded = match self.objects.upload(&image_bytes, &file_name).await {
            Ok(obj) => obj,
            Err(e) => {
                warn!("Failed to upload image for video generation: {}", e);
                return Ok(());
            }
        };

        // Partial save so a concurrent or follow-up request sees a fresh
        // image-only entry even if the video stage fails below.
        let mut record = Location {
            id: id.clone(),
            name: city.clone(),
            category: String::new(),
            city_query: city.clone(),
            image_url: uploaded.public_url.clone(),
            video_url: String::new(),
            is_preset: false,
            last_updated: Utc::now(),
        };
        if let Err(e) = self.store.upsert(&record).await {
            warn!("Partial upsert failed for {}: {}", id, e);
        }

        // 6. Video stage, soft failure with a reassuring message.
        sink.status("Animating... this may take a minute.");
        let video_uri = match self.run_video_stage(&uploaded.uri, &cancel).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Video generation failed for '{}': {}", city, e);
                sink.error("Video generation failed (beta). Enjoy the image!");
                return Ok(());
            }
        };

        // 7. Publish the video URL.
        sink.status("Finalizing video...");
        let video_url = self.public_url(&video_uri);
        info!("Video available at: {}", video_url);
        sink.video(video_url.clone());

        // 8. Final save with both artifacts.
        record.video_url = video_url;
        if let Err(e) = self.store.upsert(&record).await {
            warn!("Final upsert failed for {}: {}", id, e);
        }

        Ok(())
    }

    /// The curated-record path: same generation stages, no caller-facing
    /// streaming. An existing id without `force` gets a metadata patch only —
    /// generation is skipped entirely and its media URLs are preserved.
    #[instrument(skip(self, cancel), fields(id = %spec.id))]
    pub async fn process_preset(
        &self,
        spec: &PresetSpec,
        force: bool,
        cancel: CancellationToken,
    ) -> Result<()> {
        let existing = self.store.get(&spec.id).await?;

        if let Some(mut loc) = existing {
            if !force {
                info!("Skipping generation for [{}], updating metadata only.", spec.id);
                loc.name = spec.name.clone();
                loc.category = spec.category.clone();
                loc.is_preset = true;
                return self.store.upsert(&loc).await;
            }
        }

        let (image_url, video_url) = self
            .generate_media(&spec.id, &spec.city, &spec.context, spec.style, &cancel)
            .await?;

        let loc = Location {
            id: spec.id.clone(),
            name: spec.name.clone(),
            category: spec.category.clone(),
            city_query: spec.city.clone(),
            image_url,
            video_url,
            is_preset: true,
            last_updated: Utc::now(),
        };
        self.store.upsert(&loc).await
    }

    /// Regenerates media for an existing record, keeping its name/category.
    #[instrument(skip(self, cancel))]
    pub async fn refresh(&self, id: &str, style: StyleMode, cancel: CancellationToken) -> Result<()> {
        let mut loc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| WeatherError::Persistence(format!("location not found: {id}")))?;

        let (image_url, video_url) = self
            .generate_media(id, &loc.city_query, "", style, &cancel)
            .await?;

        loc.image_url = image_url;
        loc.video_url = video_url;
        self.store.upsert(&loc).await
    }

    /// Image → upload → video, strictly ordered; any stage failure aborts.
    /// Used by the preset and refresh paths where there is no caller to hand
    /// a partial result to.
    async fn generate_media(
        &self,
        id: &str,
        city: &str,
        context: &str,
        style: StyleMode,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        info!("Generating image for '{}' ({:?})...", city, style);
        let image_bytes = self.images.generate(city, context, style).await?;

        let file_name = format!("preset_{}_image_{}.png", id, Utc::now().timestamp());
        let uploaded = self.objects.upload(&image_bytes, &file_name).await?;
        info!("Image uploaded: {}", uploaded.public_url);

        info!("Generating video...");
        let video_uri = self.run_video_stage(&uploaded.uri, cancel).await?;
        Ok((uploaded.public_url, self.public_url(&video_uri)))
    }

    /// Submits the animation job and drives its polling loop to completion.
    async fn run_video_stage(&self, image_uri: &str, cancel: &CancellationToken) -> Result<String> {
        let handle = self.videos.submit(image_uri, "").await?;
        self.await_video(&handle, cancel).await
    }

    /// Polls the long-running operation on a fixed interval until it reports
    /// done, the caller cancels, or the deadline elapses. A transient poll
    /// failure does not abort the loop.
    async fn await_video(&self, handle: &OperationHandle, cancel: &CancellationToken) -> Result<String> {
        let deadline = tokio::time::Instant::now() + self.cfg.video_deadline;
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        // Consume the immediate first tick so polling starts one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(WeatherError::Cancelled("context cancelled during polling".into()));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(WeatherError::Video {
                        message: format!("polling deadline elapsed after {:?}", self.cfg.video_deadline),
                    });
                }
                _ = ticker.tick() => {
                    let op = match self.videos.poll(handle).await {
                        Ok(status) => status,
                        Err(e) => {
                            warn!("Polling failed, will retry: {}", e);
                            continue;
                        }
                    };
                    match op {
                        PollStatus::Pending => debug!("Still polling video operation..."),
                        PollStatus::Done(doc) => return finish_operation(doc),
                    }
                }
            }
        }
    }

    /// Converts an internal `gs://bucket/path` reference into its public URL
    /// under the configured base.
    fn public_url(&self, gs_uri: &str) -> String {
        public_url(&self.cfg.public_storage_base, gs_uri)
    }

    async fn resolve(&self, req: &WeatherRequest) -> Result<String> {
        if let (Some(lat), Some(lng)) = (req.lat, req.lng) {
            self.resolver.resolve_coordinates(lat, lng).await
        } else {
            let query = match req.city.as_deref() {
                Some(q) if !q.is_empty() => q,
                _ => self.cfg.default_city.as_str(),
            };
            Ok(self.resolver.resolve_query(query).await?.name)
        }
    }
}

fn public_url(base: &str, gs_uri: &str) -> String {
    let rest = gs_uri.strip_prefix("gs://").unwrap_or(gs_uri);
    format!("{}/{}", base.trim_end_matches('/'), rest)
}

/// Checks a finished operation document for an operation-level error, then
/// extracts the result reference tolerantly. Never returns an empty URI; an
/// unrecognized shape fails carrying the raw response for diagnosis.
fn finish_operation(doc: serde_json::Value) -> Result<String> {
    if !doc["error"].is_null() {
        return Err(WeatherError::Video {
            message: format!("operation failed: {}", doc["error"]),
        });
    }

    let response = &doc["response"];
    let video = if !response["videos"][0].is_null() {
        &response["videos"][0]
    } else if !response["generatedVideos"][0].is_null() {
        &response["generatedVideos"][0]
    } else {
        return Err(WeatherError::Video {
            message: "operation done but no videos found".into(),
        });
    };

    extract_video_uri(video).ok_or_else(|| WeatherError::Video {
        message: format!("video generated but URI is empty (raw: {video})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn public_url_strips_gs_scheme() {
        assert_eq!(
            public_url("https://cdn.example.com", "gs://bucket/videos/clip.mp4"),
            "https://cdn.example.com/bucket/videos/clip.mp4"
        );
        // Already-public references pass through under the base
        assert_eq!(
            public_url("https://cdn.example.com/", "bucket/x.mp4"),
            "https://cdn.example.com/bucket/x.mp4"
        );
    }

    #[test]
    fn finish_operation_rejects_operation_error() {
        let doc = json!({ "done": true, "error": { "code": 13, "message": "internal" } });
        let err = finish_operation(doc).unwrap_err();
        assert!(matches!(err, WeatherError::Video { .. }));
    }

    #[test]
    fn finish_operation_requires_a_video_entry() {
        let doc = json!({ "done": true, "response": {} });
        assert!(finish_operation(doc).is_err());
    }

    #[test]
    fn finish_operation_reads_generated_videos_alias() {
        let doc = json!({
            "done": true,
            "response": { "generatedVideos": [{ "video": { "gcsUri": "gs://b/v.mp4" } }] }
        });
        assert_eq!(finish_operation(doc).unwrap(), "gs://b/v.mp4");
    }
}

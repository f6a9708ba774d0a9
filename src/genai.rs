use crate::error::{Result, WeatherError};
use crate::types::{ImageGenerator, OperationHandle, PollStatus, StyleMode, VideoGenerator};
use base64::Engine as _;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

const IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
const VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

pub const DEFAULT_VIDEO_PROMPT: &str = "The camera moves in parallax as the elements in the image move naturally, while the forecast data—the bold title—remains fixed.";

const LANDMARK_PROMPT: &str = r#"Present a clear, 45° top-down view of a vertical (9:16) isometric miniature 3D cartoon scene, highlighting iconic landmarks centered in the composition to showcase precise and delicate modeling.

The scene features soft, refined textures with realistic PBR materials and gentle, lifelike lighting and shadow effects. Weather elements are creatively integrated into the urban architecture, establishing a dynamic interaction between the city's landscape and atmospheric conditions, creating an immersive weather ambiance.

Use a clean, unified composition with minimalistic aesthetics and a soft, solid-colored background that highlights the main content. The overall visual style is fresh and soothing.

Display a prominent weather icon at the top-center, with the date (x-small text) and temperature range (medium text) beneath it. The city name (large text) is positioned directly above the weather icon. The weather information has no background and can subtly overlap with the buildings.

The text should match the input city's native language.
Please retrieve current weather conditions for the specified city before rendering."#;

const DRINK_PROMPT: &str = r#"Present a clear, 45° top-down view of a vertical (9:16) isometric miniature 3D cartoon scene, highlighting iconic landmarks centered in the composition to showcase precise and delicate modeling.

A close-up of a porcelain [DRINK] cup filled with [DRINK], subtly floating a detailed city of [CITY] occupying most of the composition. Prominently displayed at the scene's center are the city's most iconic landmarks, vividly detailed and illuminated softly.

Miniature streets feature realistic, tiny vehicles moving seamlessly. With cinematic-quality lighting and depth-of-field blurring, the image creates a magical, dreamlike atmosphere. Exceptionally detailed and highly photorealistic, the scene achieves an 8K cinematic finish.

Display a prominent weather icon at the top-center, with the date (x-small text) and temperature range (medium text) beneath it. The city name (large text) is positioned directly above the weather icon. The weather information has no background and can subtly overlap with the buildings. The text should match the input city's native language. Please retrieve current weather conditions for the specified city before rendering."#;

/// Builds the final image prompt for a city. The Random style makes a fresh
/// coin flip on every call.
pub fn build_image_prompt(city: &str, extra_context: &str, style: StyleMode) -> String {
    let use_drink = match style {
        StyleMode::Landmark => false,
        StyleMode::Drink => true,
        StyleMode::Random => rand::thread_rng().gen_bool(0.5),
    };

    let mut prompt = if use_drink {
        debug!("Selected drink prompt for {}", city);
        let p = DRINK_PROMPT.replace("[CITY]", city);
        format!("{p}\n\nDRINK: the most common AM drink for this location")
    } else {
        debug!("Selected landmark prompt for {}", city);
        format!("{LANDMARK_PROMPT}\n\nCity name: {city}")
    };

    if !extra_context.is_empty() {
        prompt.push_str(&format!("\n\nContext/Setting: {extra_context}"));
    }
    prompt
}

/// Shared plumbing for the Vertex AI generative endpoints.
struct VertexClient {
    client: reqwest::Client,
    project_id: String,
    region: String,
    access_token: String,
}

impl VertexClient {
    fn model_url(&self, model: &str, verb: &str) -> String {
        format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:{verb}",
            region = self.region,
            project = self.project_id,
        )
    }

    /// Errors come back as plain messages; each caller wraps them in its own
    /// stage error so image and video failures keep their taxonomy.
    async fn post(&self, url: &str, body: Value) -> std::result::Result<Value, String> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("vertex call failed with {status}: {text}"));
        }
        resp.json().await.map_err(|e| e.to_string())
    }
}

/// Gemini image generation over the Vertex REST surface.
pub struct GeminiImageGenerator {
    vertex: VertexClient,
}

impl GeminiImageGenerator {
    pub fn new(project_id: String, region: String, access_token: String) -> Self {
        Self {
            vertex: VertexClient {
                client: reqwest::Client::new(),
                project_id,
                region,
                access_token,
            },
        }
    }
}

#[async_trait::async_trait]
impl ImageGenerator for GeminiImageGenerator {
    #[instrument(skip(self, extra_context))]
    async fn generate(&self, city: &str, extra_context: &str, style: StyleMode) -> Result<Vec<u8>> {
        let prompt = build_image_prompt(city, extra_context, style);
        info!("Generating image for city: {} using model: {}", city, IMAGE_MODEL);

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "googleSearch": {} }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": "9:16" }
            }
        });

        let url = self.vertex.model_url(IMAGE_MODEL, "generateContent");
        let resp = self
            .vertex
            .post(&url, body)
            .await
            .map_err(WeatherError::Generation)?;

        // Walk the candidate parts for the first inline image payload
        let parts = resp["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| WeatherError::Generation("no content generated".into()))?;

        for part in parts {
            if let Some(data) = part["inlineData"]["data"].as_str() {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|e| WeatherError::Generation(format!("invalid image payload: {e}")))?;
                info!("Image generated successfully. Bytes: {}", bytes.len());
                return Ok(bytes);
            }
        }

        Err(WeatherError::Generation("no image data found in response".into()))
    }
}

/// Veo video generation: submit a long-running operation, then answer status
/// queries. The orchestrator drives the polling cadence and deadline.
pub struct VeoVideoGenerator {
    vertex: VertexClient,
    bucket: String,
}

impl VeoVideoGenerator {
    pub fn new(project_id: String, region: String, access_token: String, bucket: String) -> Self {
        Self {
            vertex: VertexClient {
                client: reqwest::Client::new(),
                project_id,
                region,
                access_token,
            },
            bucket,
        }
    }
}

#[async_trait::async_trait]
impl VideoGenerator for VeoVideoGenerator {
    #[instrument(skip(self, prompt))]
    async fn submit(&self, input_image_uri: &str, prompt: &str) -> Result<OperationHandle> {
        let prompt = if prompt.is_empty() { DEFAULT_VIDEO_PROMPT } else { prompt };
        info!("Generating video with model {}. Input: {}", VIDEO_MODEL, input_image_uri);

        let body = json!({
            "instances": [{
                "prompt": prompt,
                "image": { "gcsUri": input_image_uri, "mimeType": "image/png" }
            }],
            "parameters": {
                "aspectRatio": "9:16",
                "storageUri": format!("gs://{}/videos/", self.bucket)
            }
        });

        let url = self.vertex.model_url(VIDEO_MODEL, "predictLongRunning");
        let resp = self
            .vertex
            .post(&url, body)
            .await
            .map_err(|message| WeatherError::Video { message })?;

        let name = resp["name"]
            .as_str()
            .ok_or_else(|| WeatherError::Video {
                message: "submit response missing operation name".into(),
            })?
            .to_string();

        info!("Video operation started. ID: {}", name);
        Ok(OperationHandle { name })
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<PollStatus> {
        let url = self.vertex.model_url(VIDEO_MODEL, "fetchPredictOperation");
        let resp = self
            .vertex
            .post(&url, json!({ "operationName": handle.name }))
            .await
            .map_err(|message| WeatherError::Video { message })?;

        if resp["done"].as_bool().unwrap_or(false) {
            Ok(PollStatus::Done(resp))
        } else {
            Ok(PollStatus::Pending)
        }
    }
}

/// Pulls the result reference out of a finished operation document.
///
/// The response schema is not stable across SDK/API revisions, so extraction
/// tries a top-level `gcsUri`, the alternate top-level names, and finally a
/// nested `video` object, accepting the first non-empty match.
pub fn extract_video_uri(video: &Value) -> Option<String> {
    let top_level = ["gcsUri", "videoUri", "uri"];
    for key in top_level {
        if let Some(uri) = video[key].as_str() {
            if !uri.is_empty() {
                return Some(uri.to_string());
            }
        }
    }

    let nested = &video["video"];
    for key in ["uri", "gcsUri", "videoUri"] {
        if let Some(uri) = nested[key].as_str() {
            if !uri.is_empty() {
                return Some(uri.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_handles_top_level_uri() {
        let v = json!({ "gcsUri": "gs://bucket/videos/a.mp4" });
        assert_eq!(extract_video_uri(&v).as_deref(), Some("gs://bucket/videos/a.mp4"));
    }

    #[test]
    fn extraction_handles_alternate_field_name() {
        let v = json!({ "videoUri": "gs://bucket/videos/b.mp4" });
        assert_eq!(extract_video_uri(&v).as_deref(), Some("gs://bucket/videos/b.mp4"));
    }

    #[test]
    fn extraction_handles_nested_video_object() {
        let v = json!({ "video": { "uri": "gs://bucket/videos/c.mp4" } });
        assert_eq!(extract_video_uri(&v).as_deref(), Some("gs://bucket/videos/c.mp4"));
    }

    #[test]
    fn extraction_ignores_empty_strings() {
        let v = json!({ "gcsUri": "", "video": { "uri": "gs://bucket/videos/d.mp4" } });
        assert_eq!(extract_video_uri(&v).as_deref(), Some("gs://bucket/videos/d.mp4"));
    }

    #[test]
    fn extraction_fails_on_unknown_shape() {
        let v = json!({ "something": "else" });
        assert!(extract_video_uri(&v).is_none());
    }

    #[test]
    fn forced_styles_pick_their_template() {
        let landmark = build_image_prompt("Paris", "", StyleMode::Landmark);
        assert!(landmark.contains("City name: Paris"));
        assert!(!landmark.contains("[DRINK]"));

        let drink = build_image_prompt("Paris", "", StyleMode::Drink);
        assert!(drink.contains("a detailed city of Paris"));
        assert!(drink.contains("DRINK: the most common AM drink"));
    }

    #[test]
    fn extra_context_is_appended_verbatim() {
        let p = build_image_prompt("Atlantis", "an underwater city of glass domes", StyleMode::Landmark);
        assert!(p.ends_with("Context/Setting: an underwater city of glass domes"));
    }
}

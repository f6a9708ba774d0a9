use crate::error::{Result, WeatherError};
use crate::types::{ObjectStore, UploadedObject};
use tracing::{info, instrument};

/// Google Cloud Storage client using the JSON upload API. Uploaded objects
/// are addressed internally by `gs://` URI and publicly via the configured
/// base URL (the bucket is expected to allow public reads).
pub struct GcsObjectStore {
    client: reqwest::Client,
    bucket: String,
    access_token: String,
    public_base: String,
}

impl GcsObjectStore {
    pub fn new(bucket: String, access_token: String, public_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bucket,
            access_token,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload(&self, bytes: &[u8], name: &str) -> Result<UploadedObject> {
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name=images/{}",
            self.bucket, name
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "image/png")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| WeatherError::Upload(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(WeatherError::Upload(format!(
                "upload failed with {status}: {text}"
            )));
        }

        let uri = format!("gs://{}/images/{}", self.bucket, name);
        let public_url = format!("{}/{}/images/{}", self.public_base, self.bucket, name);
        info!("Uploaded image to {}", uri);

        Ok(UploadedObject { uri, public_url })
    }
}

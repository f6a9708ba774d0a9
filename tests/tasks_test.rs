use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use weathercast::error::WeatherError;
use weathercast::orchestrator::{Orchestrator, PipelineConfig};
use weathercast::store::{InMemoryStore, MetadataStore, TypeFilter};
use weathercast::tasks;
use weathercast::types::{
    ImageGenerator, LocationResolver, ObjectStore, OperationHandle, PollStatus, ResolvedCity,
    StyleMode, UploadedObject, VideoGenerator,
};

struct NoopResolver;

#[async_trait::async_trait]
impl LocationResolver for NoopResolver {
    async fn resolve_coordinates(&self, _lat: f64, _lng: f64) -> weathercast::error::Result<String> {
        Ok("Nowhere".to_string())
    }

    async fn resolve_query(&self, query: &str) -> weathercast::error::Result<ResolvedCity> {
        Ok(ResolvedCity {
            name: query.to_string(),
            lat: 0.0,
            lng: 0.0,
        })
    }
}

struct CountingImages {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait::async_trait]
impl ImageGenerator for CountingImages {
    async fn generate(
        &self,
        _city: &str,
        _extra_context: &str,
        _style: StyleMode,
    ) -> weathercast::error::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WeatherError::Generation("stub failure".into()));
        }
        Ok(vec![1, 2, 3])
    }
}

struct OkObjects;

#[async_trait::async_trait]
impl ObjectStore for OkObjects {
    async fn upload(&self, _bytes: &[u8], name: &str) -> weathercast::error::Result<UploadedObject> {
        Ok(UploadedObject {
            uri: format!("gs://test-bucket/images/{name}"),
            public_url: format!("https://cdn.test/test-bucket/images/{name}"),
        })
    }
}

struct InstantVideos;

#[async_trait::async_trait]
impl VideoGenerator for InstantVideos {
    async fn submit(
        &self,
        _input_image_uri: &str,
        _prompt: &str,
    ) -> weathercast::error::Result<OperationHandle> {
        Ok(OperationHandle {
            name: "operations/test-op".to_string(),
        })
    }

    async fn poll(&self, _handle: &OperationHandle) -> weathercast::error::Result<PollStatus> {
        Ok(PollStatus::Done(serde_json::json!({
            "done": true,
            "response": { "videos": [{ "gcsUri": "gs://test-bucket/videos/out.mp4" }] }
        })))
    }
}

fn build(
    images: Arc<CountingImages>,
    store: Arc<InMemoryStore>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(NoopResolver),
        images,
        Arc::new(InstantVideos),
        Arc::new(OkObjects),
        store,
        PipelineConfig {
            poll_interval: Duration::from_millis(5),
            public_storage_base: "https://cdn.test".to_string(),
            ..PipelineConfig::default()
        },
    )
}

fn counting_images(fail: bool) -> Arc<CountingImages> {
    Arc::new(CountingImages {
        calls: AtomicUsize::new(0),
        fail,
    })
}

#[tokio::test]
async fn batch_skips_header_and_short_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("presets.csv");
    let mut f = std::fs::File::create(&csv_path)?;
    writeln!(f, "id,name,city,category,context")?;
    writeln!(f, "paris,Paris,Paris France,Europe,")?;
    writeln!(f, "bad-row,only-two")?;
    writeln!(f, "oz,Emerald City,Oz,Fiction,a glittering green city")?;

    let images = counting_images(false);
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = build(images.clone(), store.clone());

    let result = tasks::generate_batch(
        &orchestrator,
        csv_path.to_str().unwrap(),
        false,
        StyleMode::Random,
    )
    .await?;

    assert_eq!(result.processed, 2);
    assert_eq!(result.skipped_rows, 1);
    assert!(result.errors.is_empty());
    assert_eq!(images.calls.load(Ordering::SeqCst), 2);

    let oz = store.get("oz").await?.unwrap();
    assert!(oz.is_preset);
    assert_eq!(oz.category, "Fiction");
    assert_eq!(oz.city_query, "Oz");
    Ok(())
}

#[tokio::test]
async fn batch_continues_past_failing_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("presets.csv");
    let mut f = std::fs::File::create(&csv_path)?;
    writeln!(f, "id,name,city,category,context")?;
    writeln!(f, "a,A,City A,General,")?;
    writeln!(f, "b,B,City B,General,")?;

    let images = counting_images(true);
    let orchestrator = build(images.clone(), Arc::new(InMemoryStore::new()));

    let result = tasks::generate_batch(
        &orchestrator,
        csv_path.to_str().unwrap(),
        false,
        StyleMode::Random,
    )
    .await?;

    // Every row failed, but the run itself completed
    assert_eq!(result.processed, 0);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(images.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn migrate_defaults_empty_categories_and_skips_blank_ids() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("presets.json");
    std::fs::write(
        &path,
        serde_json::json!([
            { "id": "tokyo", "name": "Tokyo", "category": "", "image_url": "https://cdn.test/t.png", "video_url": "https://cdn.test/t.mp4" },
            { "id": "lima", "name": "Lima", "category": "Americas" },
            { "id": "", "name": "Orphan" }
        ])
        .to_string(),
    )?;

    let store = Arc::new(InMemoryStore::new());
    let migrated = tasks::run_migrate(store.clone(), path.to_str().unwrap()).await?;
    assert_eq!(migrated, 2);

    let tokyo = store.get("tokyo").await?.unwrap();
    assert_eq!(tokyo.category, "General");
    assert!(tokyo.is_preset);
    assert_eq!(tokyo.image_url, "https://cdn.test/t.png");
    assert_eq!(tokyo.video_url, "https://cdn.test/t.mp4");

    let lima = store.get("lima").await?.unwrap();
    assert_eq!(lima.category, "Americas");

    let presets = store.list(0, TypeFilter::Preset).await?;
    assert_eq!(presets.len(), 2);
    Ok(())
}

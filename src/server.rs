use crate::events::{EventSink, ProgressEvent};
use crate::orchestrator::{Orchestrator, WeatherRequest};
use crate::store::{MetadataStore, TypeFilter};
use axum::{
    extract::Query,
    http::Method,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "weathercast",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Curated preset listing
async fn presets(
    Extension(store): Extension<Arc<dyn MetadataStore>>,
) -> impl IntoResponse {
    match store.list(0, TypeFilter::Preset).await {
        Ok(locs) => Json(locs).into_response(),
        Err(e) => {
            error!("Failed to list presets: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch presets",
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    city: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

fn to_sse_event(ev: ProgressEvent) -> Event {
    let base = Event::default().event(ev.kind());
    match ev {
        ProgressEvent::Status(msg) | ProgressEvent::Error(msg) => base.data(msg),
        ProgressEvent::Video(url) => base.data(url),
        ProgressEvent::Result(card) => {
            base.data(serde_json::to_string(&card).unwrap_or_default())
        }
    }
}

/// Server-push generation endpoint. Events are streamed as they are emitted;
/// dropping the connection cancels the in-flight job via the token guard
/// owned by the stream.
async fn weather(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Query(q): Query<WeatherQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = EventSink::channel();
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let req = WeatherRequest {
        city: q.city,
        lat: q.lat,
        lng: q.lng,
    };
    tokio::spawn(async move {
        // Fatal errors were already surfaced to the client as an `error`
        // event inside the flow; here they only need logging.
        if let Err(e) = orchestrator.run_weather_flow(req, &sink, cancel).await {
            error!("Weather flow failed: {}", e);
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(move |ev| {
        let _keep_cancel_guard = &guard;
        Ok(to_sse_event(ev))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Create the HTTP server with all routes
pub fn create_server(orchestrator: Arc<Orchestrator>, store: Arc<dyn MetadataStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/weather", get(weather))
        .route("/api/presets", get(presets))
        .layer(Extension(orchestrator))
        .layer(Extension(store))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn MetadataStore>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(orchestrator, store);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("🌦  Forecast SSE:  http://localhost:{port}/api/weather?city=Paris");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

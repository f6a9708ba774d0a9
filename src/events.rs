use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The payload of a `result` event, mirroring the JSON the frontend expects.
/// Exactly one of `image_base64` / `image_url` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherCard {
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Progress events emitted by the orchestrator, in order, over one job.
/// These four kinds are the entire event vocabulary; transports map them
/// onto SSE event names or log lines without reinterpreting them.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Status(String),
    Result(WeatherCard),
    Video(String),
    Error(String),
}

impl ProgressEvent {
    /// Wire name of the event kind (`status`, `result`, `video`, `error`).
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status(_) => "status",
            ProgressEvent::Result(_) => "result",
            ProgressEvent::Video(_) => "video",
            ProgressEvent::Error(_) => "error",
        }
    }
}

/// Ordered, push-style channel the orchestrator writes progress to.
///
/// A dropped receiver (client disconnected) never fails the pipeline; the
/// send result is deliberately ignored so generation can still complete and
/// persist its artifacts.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn status(&self, msg: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Status(msg.into()));
    }

    pub fn result(&self, card: WeatherCard) {
        let _ = self.tx.send(ProgressEvent::Result(card));
    }

    pub fn video(&self, url: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Video(url.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Error(msg.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_receiver_dropped_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        // Must not panic or error out
        sink.status("still running");
        sink.video("https://example.com/v.mp4");
    }

    #[test]
    fn event_kinds_match_wire_names() {
        assert_eq!(ProgressEvent::Status("s".into()).kind(), "status");
        assert_eq!(ProgressEvent::Video("v".into()).kind(), "video");
        assert_eq!(ProgressEvent::Error("e".into()).kind(), "error");
    }
}

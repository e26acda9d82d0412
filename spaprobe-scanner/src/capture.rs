use crate::classifier::{classify, header};
use crate::driver::{NetworkEvent, NetworkExchange};
use crate::result::{now_millis, CapturedResponse, CapturedScript, FailedRequest, UrlType};
use crate::store::CaptureStore;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Append-only collections shared between the recorder task and the session.
#[derive(Clone, Default)]
pub struct CaptureBuffers {
    pub responses: Arc<Mutex<Vec<CapturedResponse>>>,
    pub scripts: Arc<Mutex<Vec<CapturedScript>>>,
    pub failures: Arc<Mutex<Vec<FailedRequest>>>,
}

impl CaptureBuffers {
    pub async fn responses(&self) -> Vec<CapturedResponse> {
        self.responses.lock().await.clone()
    }

    pub async fn scripts(&self) -> Vec<CapturedScript> {
        self.scripts.lock().await.clone()
    }

    pub async fn failures(&self) -> Vec<FailedRequest> {
        self.failures.lock().await.clone()
    }
}

/// Classifies network events and records them into [`CaptureBuffers`].
#[derive(Clone)]
pub struct ResponseRecorder {
    store: CaptureStore,
    buffers: CaptureBuffers,
}

impl ResponseRecorder {
    pub fn new(store: CaptureStore, buffers: CaptureBuffers) -> Self {
        Self { store, buffers }
    }

    /// Drain `rx` until every sender is gone.
    pub fn spawn(self, mut rx: mpsc::Receiver<NetworkEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.on_event(event).await;
            }
            debug!("Response recorder drained");
        })
    }

    pub async fn on_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::Response(exchange) => self.on_response(exchange).await,
            NetworkEvent::Failed { url, method, error } => {
                debug!("Request failed: {} {} ({})", method, url, error);
                self.buffers.failures.lock().await.push(FailedRequest {
                    url,
                    method,
                    error,
                    timestamp: now_millis(),
                });
            }
        }
    }

    pub async fn on_response(&self, exchange: NetworkExchange) {
        let content_type = header(&exchange.response_headers, "content-type")
            .map(str::to_string)
            .unwrap_or_else(|| exchange.mime_type.clone());
        let size = match &exchange.body {
            Some(body) => body.len() as u64,
            None => header(&exchange.response_headers, "content-length")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        };
        let classification = classify(&exchange.url, &content_type);
        let timestamp = now_millis();

        self.buffers.responses.lock().await.push(CapturedResponse {
            url: exchange.url.clone(),
            method: exchange.method.clone(),
            status: exchange.status,
            status_text: exchange.status_text.clone(),
            request_headers: exchange.request_headers.clone(),
            response_headers: exchange.response_headers.clone(),
            content_type,
            size,
            is_api: classification.is_api,
            url_type: classification.url_type,
            timestamp,
        });

        if classification.url_type != UrlType::Js {
            return;
        }
        let Some(body) = exchange.body.filter(|b| !b.is_empty()) else {
            return;
        };

        let local_path = match self.store.persist_script(&exchange.url, &body, timestamp).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to persist script {}: {}", exchange.url, e);
                None
            }
        };

        self.buffers.scripts.lock().await.push(CapturedScript {
            url: exchange.url,
            size: body.len() as u64,
            content: body,
            headers: exchange.response_headers,
            method: exchange.method,
            timestamp,
            local_path,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn exchange(url: &str, content_type: &str, body: Option<&str>) -> NetworkExchange {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        headers.insert("Content-Length".to_string(), "4096".to_string());
        NetworkExchange {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            request_headers: BTreeMap::new(),
            response_headers: headers,
            mime_type: content_type.to_string(),
            body: body.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_js_response_is_persisted() {
        let dir = TempDir::new().unwrap();
        let buffers = CaptureBuffers::default();
        let recorder = ResponseRecorder::new(CaptureStore::new(dir.path()), buffers.clone());

        recorder
            .on_response(exchange(
                "https://example.com/static/bundle.js",
                "application/javascript",
                Some("let a = 1;"),
            ))
            .await;

        let responses = buffers.responses().await;
        let scripts = buffers.scripts().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].url_type, UrlType::Js);
        assert_eq!(responses[0].size, 10);
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].content, "let a = 1;");
        let path = scripts[0].local_path.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "let a = 1;");
    }

    #[tokio::test]
    async fn test_missing_body_falls_back_to_content_length() {
        let dir = TempDir::new().unwrap();
        let buffers = CaptureBuffers::default();
        let recorder = ResponseRecorder::new(CaptureStore::new(dir.path()), buffers.clone());

        recorder
            .on_response(exchange("https://example.com/app.js", "text/javascript", None))
            .await;

        let responses = buffers.responses().await;
        assert_eq!(responses[0].size, 4096);
        assert!(buffers.scripts().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_js_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let buffers = CaptureBuffers::default();
        let recorder = ResponseRecorder::new(CaptureStore::new(dir.path()), buffers.clone());

        recorder
            .on_response(exchange(
                "https://example.com/api/users",
                "application/json",
                Some("[]"),
            ))
            .await;
        recorder
            .on_response(exchange("https://example.com/api/users", "application/json", Some("[]")))
            .await;

        let responses = buffers.responses().await;
        assert_eq!(responses.len(), 2, "responses are never deduplicated");
        assert!(responses.iter().all(|r| r.is_api && r.url_type == UrlType::Api));
        assert!(buffers.scripts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_capture_dir_keeps_script() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let buffers = CaptureBuffers::default();
        let recorder = ResponseRecorder::new(CaptureStore::new(blocker.join("sub")), buffers.clone());

        recorder
            .on_response(exchange("https://example.com/a.js", "text/javascript", Some("1")))
            .await;

        let scripts = buffers.scripts().await;
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].local_path.is_none());
    }

    #[tokio::test]
    async fn test_recorder_drains_channel() {
        let dir = TempDir::new().unwrap();
        let buffers = CaptureBuffers::default();
        let recorder = ResponseRecorder::new(CaptureStore::new(dir.path()), buffers.clone());
        let (tx, rx) = mpsc::channel(8);
        let handle = recorder.spawn(rx);

        tx.send(NetworkEvent::Response(exchange("https://e.com/s.css", "text/css", Some("a{}"))))
            .await
            .unwrap();
        tx.send(NetworkEvent::Failed {
            url: "https://e.com/gone".to_string(),
            method: "GET".to_string(),
            error: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(buffers.responses().await.len(), 1);
        assert_eq!(buffers.failures().await.len(), 1);
    }
}

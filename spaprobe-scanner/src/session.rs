use crate::capture::{CaptureBuffers, ResponseRecorder};
use crate::classifier::default_request_headers;
use crate::config::CrawlerConfig;
use crate::driver::{BrowserLauncher, PageDriver};
use crate::error::{DriverError, Result};
use crate::result::{CapturedResponse, CapturedScript, FailedRequest};
use crate::store::CaptureStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECORDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Installed before any page script on every document.
pub const STEALTH_SCRIPT: &str = r#"(() => {
  try { Object.defineProperty(navigator, 'webdriver', { get: () => undefined }); } catch (e) {}
  try { if (!window.chrome) { window.chrome = { runtime: {} }; } } catch (e) {}
  try { Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] }); } catch (e) {}
  try { Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] }); } catch (e) {}
})();"#;

/// Everything a session captured, handed back on close.
#[derive(Debug, Default)]
pub struct SessionCapture {
    pub responses: Vec<CapturedResponse>,
    pub scripts: Vec<CapturedScript>,
    pub failures: Vec<FailedRequest>,
}

/// One crawl's browser, page and capture buffers. Never reused across crawls.
pub struct Session {
    id: Uuid,
    launcher: Arc<dyn BrowserLauncher>,
    config: Arc<CrawlerConfig>,
    store: CaptureStore,
    buffers: CaptureBuffers,
    page: Option<Box<dyn PageDriver>>,
    recorder: Option<JoinHandle<()>>,
    restarts: u32,
}

impl Session {
    pub async fn start(launcher: Arc<dyn BrowserLauncher>, config: Arc<CrawlerConfig>) -> Result<Self> {
        let mut session = Self {
            id: Uuid::new_v4(),
            store: CaptureStore::new(config.capture_dir.clone()),
            launcher,
            config,
            buffers: CaptureBuffers::default(),
            page: None,
            recorder: None,
            restarts: 0,
        };
        session.open_page().await?;
        info!("Session {} started", session.id);
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn buffers(&self) -> &CaptureBuffers {
        &self.buffers
    }

    pub fn page(&self) -> Result<&dyn PageDriver> {
        self.page
            .as_deref()
            .ok_or_else(|| DriverError::Closed.into())
    }

    /// Tear down the browser and bring up a fresh one, re-attaching capture.
    pub async fn restart(&mut self) -> Result<()> {
        warn!("Restarting browser for session {}", self.id);
        self.shutdown_page().await;
        self.open_page().await?;
        self.restarts += 1;
        Ok(())
    }

    /// Close the page and wait for the recorder to drain what was delivered.
    pub async fn close(mut self) -> SessionCapture {
        self.shutdown_page().await;
        info!("Session {} closed", self.id);
        SessionCapture {
            responses: self.buffers.responses().await,
            scripts: self.buffers.scripts().await,
            failures: self.buffers.failures().await,
        }
    }

    async fn open_page(&mut self) -> Result<()> {
        if let Err(e) = self.store.ensure_dir().await {
            warn!("Capture directory {} unavailable: {}", self.store.root().display(), e);
        }

        let page = self.launcher.launch().await?;
        if let Err(e) = page.add_init_script(STEALTH_SCRIPT).await {
            warn!("Failed to install init script: {}", e);
        }
        if let Err(e) = page
            .set_extra_headers(&default_request_headers(&self.config.accept_language))
            .await
        {
            warn!("Failed to set extra headers: {}", e);
        }

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        if let Err(e) = page.subscribe(tx).await {
            if let Err(close_err) = page.close().await {
                debug!("Closing unsubscribed page: {}", close_err);
            }
            return Err(e.into());
        }
        let recorder = ResponseRecorder::new(self.store.clone(), self.buffers.clone());
        self.recorder = Some(recorder.spawn(rx));
        self.page = Some(page);
        Ok(())
    }

    async fn shutdown_page(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Error closing page: {}", e);
            }
        }
        if let Some(handle) = self.recorder.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(RECORDER_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("Recorder finished"),
                Ok(Err(e)) => warn!("Recorder task failed: {}", e),
                Err(_) => {
                    warn!("Recorder did not drain in time, aborting");
                    abort.abort();
                }
            }
        }
    }
}

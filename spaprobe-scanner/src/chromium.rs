//! [`PageDriver`] backed by a local Chromium over CDP.

use crate::config::CrawlerConfig;
use crate::driver::{
    BrowserLauncher, Key, NavigationResponse, NetworkEvent, NetworkExchange, PageDriver, WaitUntil,
};
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, Headers, ResourceType,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, NavigateParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// How long to keep listening for the main document response once the
/// navigation itself has finished.
const DOCUMENT_RESPONSE_GRACE: Duration = Duration::from_millis(500);
const READY_STATE_POLL: Duration = Duration::from_millis(100);
const IDLE_POLL: Duration = Duration::from_millis(250);
const IDLE_QUIET: Duration = Duration::from_millis(500);

/// Locate a Chromium-family browser: `CHROME_EXECUTABLE`, then `PATH`,
/// then the usual install locations.
pub fn find_chrome_executable() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full);
                }
            }
        }
    }

    let known: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ]
    };
    known
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

pub fn build_browser_config(config: &CrawlerConfig, exe: &Path) -> DriverResult<BrowserConfig> {
    let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(config.viewport_width, config.viewport_height)
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--ignore-certificate-errors")
        .arg("--allow-insecure-localhost")
        .arg(format!("--user-agent={}", user_agent));

    if !config.headless {
        builder = builder.with_head();
    }

    builder.build().map_err(DriverError::Launch)
}

pub struct ChromiumLauncher {
    config: CrawlerConfig,
}

impl ChromiumLauncher {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        let exe = self
            .config
            .chrome_executable
            .clone()
            .or_else(find_chrome_executable)
            .ok_or_else(|| {
                DriverError::Launch(
                    "no Chromium-family browser found; install Chrome/Chromium or set CHROME_EXECUTABLE"
                        .to_string(),
                )
            })?;
        info!("Launching browser {}", exe.display());

        let browser_config = build_browser_config(&self.config, &exe)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(format!("{}: {}", exe.display(), e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(format!("failed to open page: {}", e)));
            }
        };
        page.execute(EnableParams::default()).await.map_err(protocol)?;

        Ok(Box::new(ChromiumPage {
            page,
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler_task,
            listener: Mutex::new(None),
        }))
    }
}

fn protocol(e: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

fn evaluation(e: impl std::fmt::Display) -> DriverError {
    DriverError::Evaluation(e.to_string())
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn headers_to_map(headers: &Headers) -> BTreeMap<String, String> {
    headers
        .inner()
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct ChromiumPage {
    page: Page,
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumPage {
    async fn eval_value(&self, script: &str) -> DriverResult<Value> {
        let result = self.page.evaluate(script).await.map_err(evaluation)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn navigate_raw(&self, url: &str) -> DriverResult<()> {
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        match &response.result.error_text {
            Some(text) if !text.is_empty() => Err(DriverError::Navigation(text.clone())),
            _ => Ok(()),
        }
    }

    async fn wait_ready_state(&self) {
        loop {
            match self.eval_value("document.readyState").await {
                Ok(Value::String(state)) if state != "loading" => return,
                _ => tokio::time::sleep(READY_STATE_POLL).await,
            }
        }
    }

    /// Resource-count quiet period on a complete document.
    async fn wait_network_idle(&self) {
        let mut last_count = u64::MAX;
        let mut quiet_since = Instant::now();
        loop {
            let count = self
                .eval_value("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let complete = matches!(
                self.eval_value("document.readyState").await,
                Ok(Value::String(ref s)) if s == "complete"
            );

            if !complete || count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= IDLE_QUIET {
                debug!("Network idle with {} resources", count);
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        documents: &mut EventStream<EventResponseReceived>,
    ) -> DriverResult<Option<NavigationResponse>> {
        match wait_until {
            WaitUntil::Commit => self.navigate_raw(url).await?,
            WaitUntil::DomContentLoaded => {
                self.navigate_raw(url).await?;
                self.wait_ready_state().await;
            }
            WaitUntil::Load => {
                self.page
                    .goto(url)
                    .await
                    .map_err(|e| DriverError::Navigation(e.to_string()))?;
            }
            WaitUntil::NetworkIdle => {
                self.page
                    .goto(url)
                    .await
                    .map_err(|e| DriverError::Navigation(e.to_string()))?;
                self.wait_network_idle().await;
            }
        }

        let response = tokio::time::timeout(DOCUMENT_RESPONSE_GRACE, async {
            while let Some(event) = documents.next().await {
                if event.r#type == ResourceType::Document {
                    return Some(NavigationResponse {
                        url: event.response.url.clone(),
                        status: u16::try_from(event.response.status).unwrap_or(0),
                        status_text: event.response.status_text.clone(),
                        headers: headers_to_map(&event.response.headers),
                    });
                }
            }
            None
        })
        .await
        .ok()
        .flatten();
        Ok(response)
    }

    async fn key_event(&self, kind: DispatchKeyEventType, key: Key) -> DriverResult<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key.name())
            .code(key.name())
            .windows_virtual_key_code(key.key_code())
            .native_virtual_key_code(key.key_code());
        if key == Key::Enter && kind == DispatchKeyEventType::KeyDown {
            builder = builder.text("\r");
        }
        let params = builder.build().map_err(protocol)?;
        self.page.execute(params).await.map_err(protocol)?;
        Ok(())
    }

    async fn element(&self, selector: &str, index: usize) -> DriverResult<chromiumoxide::Element> {
        self.page
            .find_elements(selector)
            .await
            .map_err(protocol)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| DriverError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> DriverResult<Option<NavigationResponse>> {
        let mut documents = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol)?;

        match tokio::time::timeout(timeout, self.navigate(url, wait_until, &mut documents)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn evaluate(&self, script: &str) -> DriverResult<Value> {
        self.eval_value(script).await
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        Ok(self.eval_value(&script).await?.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, selector: &str, index: usize) -> DriverResult<bool> {
        let script = format!(
            r#"(() => {{
  const el = document.querySelectorAll({})[{}];
  if (!el) return false;
  const style = window.getComputedStyle(el);
  if (style.visibility === 'hidden' || style.display === 'none' || style.opacity === '0') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
}})()"#,
            js_string(selector),
            index
        );
        Ok(self.eval_value(&script).await?.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str, index: usize) -> DriverResult<()> {
        self.element(selector, index)
            .await?
            .click()
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn hover(&self, selector: &str, index: usize) -> DriverResult<()> {
        self.element(selector, index)
            .await?
            .hover()
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn fill(&self, selector: &str, index: usize, value: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
  const el = document.querySelectorAll({})[{}];
  if (!el) return false;
  el.focus();
  el.value = {};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
            js_string(selector),
            index,
            js_string(value)
        );
        match self.eval_value(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(DriverError::ElementNotFound {
                selector: selector.to_string(),
                index,
            }),
        }
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{}]; return el ? el.getAttribute({}) : null; }})()",
            js_string(selector),
            index,
            js_string(name)
        );
        Ok(self.eval_value(&script).await?.as_str().map(str::to_string))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> DriverResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(protocol)?;
        self.page.execute(params).await.map_err(protocol)?;
        Ok(())
    }

    async fn press_key(&self, key: Key) -> DriverResult<()> {
        self.key_event(DispatchKeyEventType::KeyDown, key).await?;
        self.key_event(DispatchKeyEventType::KeyUp, key).await
    }

    async fn url(&self) -> DriverResult<String> {
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(protocol)?
            .unwrap_or_default())
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.eval_value("history.back()").await?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(protocol)
    }

    async fn add_init_script(&self, source: &str) -> DriverResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()> {
        let value = serde_json::to_value(headers).map_err(protocol)?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(value)))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn subscribe(&self, sink: mpsc::Sender<NetworkEvent>) -> DriverResult<()> {
        let listener = NetworkListener::attach(self.page.clone()).await?;
        let handle = tokio::spawn(listener.run(sink));
        let previous = self
            .listener
            .lock()
            .map_err(|_| DriverError::Protocol("listener lock poisoned".to_string()))?
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        if let Err(e) = self.page.clone().close().await {
            debug!("Page close: {}", e);
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait: {}", e);
            }
        }
        self.handler_task.abort();
        Ok(())
    }
}

#[derive(Debug)]
struct PendingRequest {
    url: String,
    method: String,
    headers: BTreeMap<String, String>,
}

#[derive(Debug)]
struct PendingResponse {
    resource_type: ResourceType,
    url: String,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    mime_type: String,
}

/// A response whose loading has finished. Only the body is still missing.
#[derive(Debug)]
struct ReadyExchange {
    request_id: String,
    request: Option<PendingRequest>,
    response: PendingResponse,
}

impl ReadyExchange {
    fn wants_body(&self) -> bool {
        self.response.resource_type == ResourceType::Script
            || self.response.mime_type.contains("javascript")
            || self.response.mime_type.contains("json")
    }

    fn into_event(self, body: Option<String>) -> NetworkEvent {
        let (method, request_headers) = self
            .request
            .map(|r| (r.method, r.headers))
            .unwrap_or_else(|| ("GET".to_string(), BTreeMap::new()));
        NetworkEvent::Response(NetworkExchange {
            url: self.response.url,
            method,
            status: self.response.status,
            status_text: self.response.status_text,
            request_headers,
            response_headers: self.response.headers,
            mime_type: self.response.mime_type,
            body,
        })
    }
}

/// Pairs requests, responses and completions by request id. Tolerates a
/// `loadingFinished` that arrives ahead of its `responseReceived`.
#[derive(Debug, Default)]
struct ExchangeStitcher {
    requests: HashMap<String, PendingRequest>,
    responses: HashMap<String, PendingResponse>,
    finished_early: HashSet<String>,
}

impl ExchangeStitcher {
    fn on_request(&mut self, request_id: String, request: PendingRequest) {
        self.requests.insert(request_id, request);
    }

    fn on_response(&mut self, request_id: String, response: PendingResponse) -> Option<ReadyExchange> {
        if self.finished_early.remove(&request_id) {
            return Some(ReadyExchange {
                request: self.requests.remove(&request_id),
                request_id,
                response,
            });
        }
        self.responses.insert(request_id, response);
        None
    }

    fn on_finished(&mut self, request_id: &str) -> Option<ReadyExchange> {
        match self.responses.remove(request_id) {
            Some(response) => Some(ReadyExchange {
                request_id: request_id.to_string(),
                request: self.requests.remove(request_id),
                response,
            }),
            None => {
                self.finished_early.insert(request_id.to_string());
                None
            }
        }
    }

    fn on_failed(&mut self, request_id: &str, error: &str) -> Option<NetworkEvent> {
        self.responses.remove(request_id);
        self.finished_early.remove(request_id);
        self.requests
            .remove(request_id)
            .map(|req| NetworkEvent::Failed {
                url: req.url,
                method: req.method,
                error: error.to_string(),
            })
    }

    fn in_flight(&self) -> usize {
        self.requests.len() + self.responses.len() + self.finished_early.len()
    }
}

enum Cdp {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

/// Feeds CDP network events through an [`ExchangeStitcher`] and forwards
/// the resulting [`NetworkEvent`]s.
struct NetworkListener {
    page: Page,
    requests: EventStream<EventRequestWillBeSent>,
    responses: EventStream<EventResponseReceived>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
    stitcher: ExchangeStitcher,
}

impl NetworkListener {
    async fn attach(page: Page) -> DriverResult<Self> {
        Ok(Self {
            requests: page.event_listener::<EventRequestWillBeSent>().await.map_err(protocol)?,
            responses: page.event_listener::<EventResponseReceived>().await.map_err(protocol)?,
            finished: page.event_listener::<EventLoadingFinished>().await.map_err(protocol)?,
            failed: page.event_listener::<EventLoadingFailed>().await.map_err(protocol)?,
            page,
            stitcher: ExchangeStitcher::default(),
        })
    }

    async fn run(mut self, sink: mpsc::Sender<NetworkEvent>) {
        loop {
            // Polled in CDP order so a buffered response is seen before its completion.
            let next = tokio::select! {
                biased;
                Some(ev) = self.requests.next() => Cdp::Request(ev),
                Some(ev) = self.responses.next() => Cdp::Response(ev),
                Some(ev) = self.finished.next() => Cdp::Finished(ev),
                Some(ev) = self.failed.next() => Cdp::Failed(ev),
                else => break,
            };

            let ready = match next {
                Cdp::Request(ev) => {
                    self.stitcher.on_request(
                        ev.request_id.inner().clone(),
                        PendingRequest {
                            url: ev.request.url.clone(),
                            method: ev.request.method.clone(),
                            headers: headers_to_map(&ev.request.headers),
                        },
                    );
                    None
                }
                Cdp::Response(ev) => self.stitcher.on_response(
                    ev.request_id.inner().clone(),
                    PendingResponse {
                        resource_type: ev.r#type.clone(),
                        url: ev.response.url.clone(),
                        status: u16::try_from(ev.response.status).unwrap_or(0),
                        status_text: ev.response.status_text.clone(),
                        headers: headers_to_map(&ev.response.headers),
                        mime_type: ev.response.mime_type.clone(),
                    },
                ),
                Cdp::Finished(ev) => self.stitcher.on_finished(ev.request_id.inner()),
                Cdp::Failed(ev) => {
                    if let Some(failed) =
                        self.stitcher.on_failed(ev.request_id.inner(), &ev.error_text)
                        && sink.send(failed).await.is_err()
                    {
                        break;
                    }
                    None
                }
            };

            if let Some(ready) = ready {
                let body = if ready.wants_body() {
                    self.body(&ready.request_id).await
                } else {
                    None
                };
                if sink.send(ready.into_event(body)).await.is_err() {
                    break;
                }
            }
        }
        debug!(
            "Network listener stopped with {} exchange(s) in flight",
            self.stitcher.in_flight()
        );
    }

    async fn body(&self, request_id: &str) -> Option<String> {
        let params = GetResponseBodyParams::new(request_id.to_string());
        match self.page.execute(params).await {
            Ok(resp) if resp.result.base64_encoded => {
                match base64::engine::general_purpose::STANDARD.decode(&resp.result.body) {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        debug!("Body of {} is not valid base64: {}", request_id, e);
                        None
                    }
                }
            }
            Ok(resp) => Some(resp.result.body.clone()),
            Err(e) => {
                debug!("No body for {}: {}", request_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::crawler::Crawler;
    use crate::result::UrlType;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn test_headers_to_map_stringifies_values() {
        let headers = Headers::new(serde_json::json!({
            "content-type": "text/html",
            "content-length": 42
        }));
        let map = headers_to_map(&headers);
        assert_eq!(map.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(map.get("content-length").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r##"a[href^="#"]"##), r##""a[href^=\"#\"]""##);
    }

    fn pending_request(url: &str) -> PendingRequest {
        PendingRequest {
            url: url.to_string(),
            method: "POST".to_string(),
            headers: BTreeMap::from([("x-token".to_string(), "abc".to_string())]),
        }
    }

    fn pending_response(url: &str) -> PendingResponse {
        PendingResponse {
            resource_type: ResourceType::Script,
            url: url.to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::new(),
            mime_type: "application/javascript".to_string(),
        }
    }

    #[test]
    fn test_stitcher_response_then_finished() {
        let mut stitcher = ExchangeStitcher::default();
        stitcher.on_request("1".into(), pending_request("https://e.com/bundle.js"));
        assert!(stitcher.on_response("1".into(), pending_response("https://e.com/bundle.js")).is_none());

        let ready = stitcher.on_finished("1").expect("exchange should complete");
        assert!(ready.wants_body());
        match ready.into_event(Some("code".into())) {
            NetworkEvent::Response(exchange) => {
                assert_eq!(exchange.url, "https://e.com/bundle.js");
                assert_eq!(exchange.method, "POST");
                assert_eq!(exchange.body.as_deref(), Some("code"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(stitcher.in_flight(), 0);
    }

    #[test]
    fn test_stitcher_finished_before_response() {
        let mut stitcher = ExchangeStitcher::default();
        stitcher.on_request("7".into(), pending_request("https://e.com/bundle.js"));
        assert!(stitcher.on_finished("7").is_none());

        let ready = stitcher
            .on_response("7".into(), pending_response("https://e.com/bundle.js"))
            .expect("late response should complete the exchange");
        assert_eq!(ready.request_id, "7");
        assert_eq!(ready.request.as_ref().map(|r| r.method.as_str()), Some("POST"));
        assert_eq!(stitcher.in_flight(), 0);
    }

    #[test]
    fn test_stitcher_each_exchange_completes_once() {
        let mut stitcher = ExchangeStitcher::default();
        stitcher.on_request("1".into(), pending_request("https://e.com/a.js"));
        stitcher.on_response("1".into(), pending_response("https://e.com/a.js"));
        assert!(stitcher.on_finished("1").is_some());
        assert!(stitcher.on_finished("1").is_none());
    }

    #[test]
    fn test_stitcher_failed_request() {
        let mut stitcher = ExchangeStitcher::default();
        stitcher.on_request("3".into(), pending_request("https://e.com/api/x"));
        match stitcher.on_failed("3", "net::ERR_ABORTED") {
            Some(NetworkEvent::Failed { url, error, .. }) => {
                assert_eq!(url, "https://e.com/api/x");
                assert_eq!(error, "net::ERR_ABORTED");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(stitcher.in_flight(), 0);
    }

    async fn serve_app(server: &MockServer) {
        let html = format!(
            "<html><head><title>Fixture</title><script src=\"/static/bundle.js\"></script></head><body><main>{}</main></body></html>",
            "<p>Lorem ipsum dolor sit amet, consectetur adipiscing elit.</p>".repeat(40)
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/bundle.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("window.__fixture = true;", "application/javascript"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    fn fast_config(dir: &TempDir) -> CrawlerConfig {
        CrawlerConfig::default()
            .with_pacing(PacingConfig::zero())
            .with_capture_dir(dir.path())
            .with_explore(false)
    }

    #[tokio::test]
    #[ignore] // needs a local Chromium
    async fn test_chromium_crawl_captures_bundle() {
        let server = MockServer::start().await;
        serve_app(&server).await;
        let dir = TempDir::new().unwrap();

        let result = Crawler::chromium(fast_config(&dir))
            .crawl(&format!("{}/", server.uri()))
            .await
            .unwrap();

        assert!(result.page_state.has_content);
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].url.ends_with("/static/bundle.js"));
        assert!(result.urls.iter().any(|r| r.url_type == UrlType::Js));
    }

    #[tokio::test]
    #[ignore] // needs a local Chromium
    async fn test_chromium_404_is_terminal() {
        let server = MockServer::start().await;
        serve_app(&server).await;
        let dir = TempDir::new().unwrap();

        let err = Crawler::chromium(fast_config(&dir))
            .crawl(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();

        assert!(err.is_terminal());
    }

    #[tokio::test]
    #[ignore] // needs a local Chromium
    async fn test_chromium_quick_check_reads_title() {
        let server = MockServer::start().await;
        serve_app(&server).await;
        let dir = TempDir::new().unwrap();

        let report = Crawler::chromium(fast_config(&dir))
            .quick_check(&format!("{}/", server.uri()))
            .await
            .unwrap();

        assert!(report.accessible);
        assert_eq!(report.status, Some(200));
        assert_eq!(report.title, "Fixture");
    }
}

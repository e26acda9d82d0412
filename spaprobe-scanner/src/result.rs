use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Coarse category of a captured URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlType {
    Js,
    Css,
    Image,
    Api,
    Other,
}

impl UrlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlType::Js => "js",
            UrlType::Css => "css",
            UrlType::Image => "image",
            UrlType::Api => "api",
            UrlType::Other => "other",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed network response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    pub content_type: String,
    pub size: u64,
    pub is_api: bool,
    pub url_type: UrlType,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

/// A JavaScript body captured from the network and written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedScript {
    pub url: String,
    pub content: String,
    pub size: u64,
    pub headers: BTreeMap<String, String>,
    pub method: String,
    pub timestamp: i64,
    /// `None` when the write to the capture directory failed.
    pub local_path: Option<PathBuf>,
}

/// A request the browser gave up on (DNS failure, reset, blocked...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRequest {
    pub url: String,
    pub method: String,
    pub error: String,
    pub timestamp: i64,
}

/// Readiness verdict for the current document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub has_content: bool,
    pub is_js_rendered: bool,
    pub is_stable: bool,
    pub content_score: f64,
    pub errors: Vec<String>,
    pub loading_indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedRoute {
    pub url: String,
    pub title: String,
    pub content_score: f64,
    pub timestamp: i64,
}

/// Everything one crawl produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub session_id: Uuid,
    pub target_url: String,
    pub final_url: String,
    /// Name of the navigation strategy that landed the page.
    pub navigation_strategy: String,
    pub files: Vec<CapturedScript>,
    pub urls: Vec<CapturedResponse>,
    pub routes: Vec<VisitedRoute>,
    pub page_state: PageState,
    pub failed_requests: Vec<FailedRequest>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl CrawlResult {
    pub fn new(session_id: Uuid, target_url: String) -> Self {
        let now = now_millis();
        Self {
            session_id,
            final_url: target_url.clone(),
            target_url,
            navigation_strategy: String::new(),
            files: Vec::new(),
            urls: Vec::new(),
            routes: Vec::new(),
            page_state: PageState::default(),
            failed_requests: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.finished_at - self.started_at
    }
}

/// Outcome of a quick reachability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityReport {
    pub url: String,
    pub accessible: bool,
    pub status: Option<u16>,
    pub title: String,
    pub page_state: PageState,
    pub message: String,
    pub elapsed_ms: u64,
}

/// How one diagnostic navigation strategy fared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: String,
    /// The browser got a document back, whatever its status.
    pub reached: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub url: String,
    pub attempts: Vec<StrategyReport>,
    pub status: Option<u16>,
    pub load_time_ms: Option<u64>,
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub page_state: Option<PageState>,
    pub failed_requests: Vec<FailedRequest>,
    /// Captured responses with status >= 400.
    pub error_responses: Vec<CapturedResponse>,
}

impl DiagnosticReport {
    pub fn reached(&self) -> bool {
        self.attempts.iter().any(|a| a.reached)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

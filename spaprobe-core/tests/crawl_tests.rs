// Tests for crawl execution

use async_trait::async_trait;
use spaprobe_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_check, execute_crawl, execute_diagnose,
    extract_route, extract_url_path,
};
use spaprobe_scanner::driver::{BrowserLauncher, PageDriver};
use spaprobe_scanner::error::{DriverError, DriverResult};
use spaprobe_scanner::{CrawlerConfig, ScanError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct NoBrowser {
    launches: AtomicUsize,
}

#[async_trait]
impl BrowserLauncher for NoBrowser {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Err(DriverError::Launch("no browser in tests".to_string()))
    }
}

fn options(url: &str, dir: &TempDir, launcher: Arc<NoBrowser>) -> CrawlOptions {
    let mut options = CrawlOptions::new(url, CrawlerConfig::default().with_capture_dir(dir.path()));
    options.launcher = Some(launcher);
    options
}

fn no_browser() -> Arc<NoBrowser> {
    Arc::new(NoBrowser {
        launches: AtomicUsize::new(0),
    })
}

// ============================================================================
// URL Path Extraction Tests
// ============================================================================

#[test]
fn test_extract_url_path_root() {
    assert_eq!(extract_url_path("http://example.com/"), "/");
}

#[test]
fn test_extract_url_path_empty_path() {
    assert_eq!(extract_url_path("http://example.com"), "/");
}

#[test]
fn test_extract_url_path_nested() {
    assert_eq!(extract_url_path("https://example.com/app/#/users"), "/app/");
}

#[test]
fn test_extract_url_path_with_query() {
    assert_eq!(extract_url_path("http://example.com/api?key=value"), "/api");
}

#[test]
fn test_extract_url_path_invalid_url() {
    assert_eq!(extract_url_path("not a url"), "not a url");
}

#[test]
fn test_extract_route_keeps_fragment() {
    assert_eq!(extract_route("https://e.com/#/settings"), "/#/settings");
    assert_eq!(extract_route("https://e.com/#/profile"), "/#/profile");
    assert_eq!(extract_route("https://e.com/app/#/users?tab=2"), "/app/#/users?tab=2");
}

#[test]
fn test_extract_route_keeps_query() {
    assert_eq!(extract_route("http://example.com/search?q=rust"), "/search?q=rust");
    assert_eq!(extract_route("http://example.com"), "/");
    assert_eq!(extract_route("not a url"), "not a url");
}

// ============================================================================
// Crawl Options Tests
// ============================================================================

#[test]
fn test_crawl_options_defaults() {
    let options = CrawlOptions::new("https://example.com", CrawlerConfig::default());
    assert_eq!(options.url, "https://example.com");
    assert!(!options.show_progress_bars);
    assert!(options.launcher.is_none());
}

// ============================================================================
// Execution Tests
// ============================================================================

#[tokio::test]
async fn test_execute_crawl_reports_launch_failure() {
    let dir = TempDir::new().unwrap();
    let launcher = no_browser();
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: CrawlProgressCallback = Arc::new(move |msg: String| {
        sink.lock().unwrap().push(msg);
    });

    let err = execute_crawl(
        options("https://example.com", &dir, launcher.clone()),
        Some(callback),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Browser(DriverError::Launch(_))));
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    let messages = messages.lock().unwrap();
    assert_eq!(
        messages.first().map(String::as_str),
        Some("Launching browser for https://example.com/")
    );
}

#[tokio::test]
async fn test_execute_crawl_rejects_non_http_url() {
    let dir = TempDir::new().unwrap();
    let launcher = no_browser();

    let err = execute_crawl(options("ftp://example.com/", &dir, launcher.clone()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::InvalidUrl(_)));
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_execute_check_reports_launch_failure() {
    let dir = TempDir::new().unwrap();
    let result = execute_check(options("https://example.com", &dir, no_browser()), None).await;
    assert!(matches!(result, Err(ScanError::Browser(_))));
}

#[tokio::test]
async fn test_execute_diagnose_reports_launch_failure() {
    let dir = TempDir::new().unwrap();
    let result = execute_diagnose(options("https://example.com", &dir, no_browser()), None).await;
    assert!(matches!(result, Err(ScanError::Browser(_))));
}

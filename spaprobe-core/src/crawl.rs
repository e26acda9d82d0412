use indicatif::{ProgressBar, ProgressStyle};
use spaprobe_scanner::result::{AccessibilityReport, CrawlResult, DiagnosticReport};
use spaprobe_scanner::{BrowserLauncher, ChromiumLauncher, Crawler, CrawlerConfig, ScanError};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Options for configuring a crawl, check or diagnose run
pub struct CrawlOptions {
    pub url: String,
    pub config: CrawlerConfig,
    pub show_progress_bars: bool,
    /// Browser to drive. `None` launches a local Chromium.
    pub launcher: Option<Arc<dyn BrowserLauncher>>,
}

impl CrawlOptions {
    pub fn new(url: impl Into<String>, config: CrawlerConfig) -> Self {
        Self {
            url: url.into(),
            config,
            show_progress_bars: false,
            launcher: None,
        }
    }
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Path plus query and fragment, so hash-router routes stay distinct
pub fn extract_route(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => {
            let mut route = extract_url_path(url);
            if let Some(query) = u.query() {
                route.push('?');
                route.push_str(query);
            }
            if let Some(fragment) = u.fragment() {
                route.push('#');
                route.push_str(fragment);
            }
            route
        }
        Err(_) => url.to_string(),
    }
}

fn new_spinner(show: bool, message: &str) -> Option<Arc<ProgressBar>> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    Some(Arc::new(pb))
}

/// Build the crawler for `options`, forwarding scanner progress to the
/// spinner (when shown) and to the caller's callback.
fn build_crawler(
    options: CrawlOptions,
    spinner: Option<Arc<ProgressBar>>,
    progress_callback: Option<CrawlProgressCallback>,
) -> Crawler {
    let CrawlOptions {
        config, launcher, ..
    } = options;

    let crawler = match launcher {
        Some(launcher) => Crawler::new(launcher).with_config(config),
        None => {
            debug!("Using local Chromium launcher");
            Crawler::new(Arc::new(ChromiumLauncher::new(config.clone()))).with_config(config)
        }
    };

    let forward: spaprobe_scanner::ProgressCallback = Arc::new(move |message: String| {
        if let Some(ref pb) = spinner {
            pb.set_message(message.clone());
            pb.tick();
        }
        if let Some(ref callback) = progress_callback {
            callback(message);
        }
    });
    crawler.with_progress_callback(forward)
}

/// Execute a crawl with the given options
/// Returns the crawl result
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlResult, ScanError> {
    let url = options.url.clone();
    let progress_bar = new_spinner(options.show_progress_bars, "Starting crawl...");
    let crawler = build_crawler(options, progress_bar.clone(), progress_callback);

    let outcome = crawler.crawl(&url).await;
    if let Err(ref e) = outcome {
        warn!("Crawl of {} failed: {}", url, e);
    }

    if let Some(ref pb) = progress_bar {
        match &outcome {
            Ok(result) => pb.finish_with_message(format!(
                "Crawl complete! {} responses, {} scripts, {} routes",
                result.urls.len(),
                result.files.len(),
                result.routes.len()
            )),
            Err(_) => pb.finish_with_message("Crawl failed"),
        }
    }

    outcome
}

/// Run a quick accessibility check
pub async fn execute_check(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<AccessibilityReport, ScanError> {
    let url = options.url.clone();
    let progress_bar = new_spinner(options.show_progress_bars, "Checking accessibility...");
    let crawler = build_crawler(options, progress_bar.clone(), progress_callback);

    let outcome = crawler.quick_check(&url).await;

    if let Some(ref pb) = progress_bar {
        pb.finish_and_clear();
    }
    outcome
}

/// Run network diagnostics against a single URL
pub async fn execute_diagnose(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<DiagnosticReport, ScanError> {
    let url = options.url.clone();
    let progress_bar = new_spinner(options.show_progress_bars, "Running diagnostics...");
    let crawler = build_crawler(options, progress_bar.clone(), progress_callback);

    let outcome = crawler.diagnose(&url).await;

    if let Some(ref pb) = progress_bar {
        pb.finish_and_clear();
    }
    outcome
}

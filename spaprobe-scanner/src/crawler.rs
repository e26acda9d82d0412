use crate::activation::{ActivationTier, ContentPipeline};
use crate::chromium::ChromiumLauncher;
use crate::config::{CrawlerConfig, NavigationStrategy};
use crate::driver::{BrowserLauncher, PageDriver, WaitUntil};
use crate::error::{Result, ScanError};
use crate::navigation::{AttemptOutcome, NavigationController};
use crate::result::{
    now_millis, AccessibilityReport, CrawlResult, DiagnosticReport, PageState, StrategyReport,
    VisitedRoute,
};
use crate::routes::RouteExplorer;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

const QUICK_CHECK_NAV_TIMEOUT: Duration = Duration::from_secs(15);

/// Drives one browser session per call through navigation, readiness,
/// activation and exploration.
pub struct Crawler {
    launcher: Arc<dyn BrowserLauncher>,
    config: Arc<CrawlerConfig>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            config: Arc::new(CrawlerConfig::default()),
            progress_callback: None,
        }
    }

    /// Crawler backed by a local Chromium.
    pub fn chromium(config: CrawlerConfig) -> Self {
        Self::new(Arc::new(ChromiumLauncher::new(config.clone()))).with_config(config)
    }

    pub fn with_config(mut self, config: CrawlerConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    fn progress(&self, message: impl Into<String>) {
        if let Some(cb) = &self.progress_callback {
            cb(message.into());
        }
    }

    /// Crawl a single target. The session is closed whether or not the
    /// crawl succeeds; only navigation and launch failures are errors.
    pub async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        let target = parse_target(url)?;
        let explorer = RouteExplorer::from_config(&self.config)?;
        info!("Starting crawl of {}", target);

        self.progress(format!("Launching browser for {}", target));
        let mut session = Session::start(self.launcher.clone(), self.config.clone()).await?;
        let mut result = CrawlResult::new(session.id(), target.to_string());

        let outcome = self
            .run(&mut session, target.as_str(), &explorer, &mut result)
            .await;

        self.progress("Closing browser".to_string());
        let capture = session.close().await;
        result.files = capture.scripts;
        result.urls = capture.responses;
        result.failed_requests = capture.failures;
        result.finished_at = now_millis();

        outcome?;
        info!(
            "Crawl of {} finished: {} responses, {} scripts, {} routes in {}ms",
            result.target_url,
            result.urls.len(),
            result.files.len(),
            result.routes.len(),
            result.duration_ms()
        );
        Ok(result)
    }

    async fn run(
        &self,
        session: &mut Session,
        url: &str,
        explorer: &RouteExplorer,
        result: &mut CrawlResult,
    ) -> Result<()> {
        self.progress(format!("Navigating to {}", url));
        let landed = NavigationController::new(&self.config)
            .navigate(session, url)
            .await?;
        result.navigation_strategy = landed.strategy;

        let page = session.page()?;
        let pipeline = ContentPipeline::new(&self.config);

        self.progress("Waiting for page content".to_string());
        result.page_state = pipeline.ensure_content(page).await;
        if let Ok(current) = page.url().await {
            result.final_url = current;
        }

        if !self.config.explore {
            return Ok(());
        }

        let enrich = self.enrich(page, &pipeline, explorer, &mut result.routes);
        match self.config.crawl_deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, enrich).await.is_err() {
                    warn!(
                        "Crawl deadline of {}s reached, keeping partial results",
                        deadline.as_secs()
                    );
                }
            }
            None => enrich.await,
        }
        Ok(())
    }

    /// Dynamic-content pass: sweep, click, explore routes, poke search forms.
    async fn enrich(
        &self,
        page: &dyn PageDriver,
        pipeline: &ContentPipeline,
        explorer: &RouteExplorer,
        routes: &mut Vec<VisitedRoute>,
    ) {
        let pacing = &self.config.pacing;
        let activator = &pipeline.activator;

        self.progress("Scrolling through page".to_string());
        activator
            .run_tier(page, &ActivationTier::scroll_sweep(pacing))
            .await;

        self.progress("Clicking interactive elements".to_string());
        activator
            .run_tier(page, &ActivationTier::interactive_clicks(pacing))
            .await;

        self.progress("Exploring SPA routes".to_string());
        explorer.explore_into(page, pipeline, routes).await;

        self.progress("Trying search forms".to_string());
        activator
            .run_tier(page, &ActivationTier::search_form(pacing))
            .await;
    }

    /// Load the page once and report whether it serves content.
    pub async fn quick_check(&self, url: &str) -> Result<AccessibilityReport> {
        let target = parse_target(url)?;
        let start = Instant::now();
        let session = Session::start(self.launcher.clone(), self.config.clone()).await?;

        let mut report = AccessibilityReport {
            url: target.to_string(),
            accessible: false,
            status: None,
            title: String::new(),
            page_state: PageState::default(),
            message: String::new(),
            elapsed_ms: 0,
        };

        if let Err(e) = self.check_page(&session, target.as_str(), &mut report).await {
            report.message = format!("Navigation failed: {}", e);
        }
        session.close().await;

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn check_page(
        &self,
        session: &Session,
        url: &str,
        report: &mut AccessibilityReport,
    ) -> Result<()> {
        let page = session.page()?;
        let response = page
            .goto(url, WaitUntil::DomContentLoaded, QUICK_CHECK_NAV_TIMEOUT)
            .await?;
        report.status = response.map(|r| r.status);

        let pipeline = ContentPipeline::new(&self.config);
        report.page_state = pipeline
            .detector
            .detect(page, self.config.readiness.quick_check_wait)
            .await;
        report.title = page.title().await.unwrap_or_default();

        let status_ok = report.status.is_none_or(|s| s < 400);
        report.accessible = status_ok && report.page_state.has_content;
        report.message = match report.status {
            Some(status) if !status_ok => format!("Server answered HTTP {}", status),
            _ if report.page_state.has_content => "Page is accessible and has content".to_string(),
            _ => "Page loaded but no content was detected".to_string(),
        };
        Ok(())
    }

    /// Try each diagnostic strategy until one reaches the page, then run the
    /// readiness pipeline and collect network failures.
    pub async fn diagnose(&self, url: &str) -> Result<DiagnosticReport> {
        let target = parse_target(url)?;
        let session = Session::start(self.launcher.clone(), self.config.clone()).await?;

        let mut report = DiagnosticReport {
            url: target.to_string(),
            attempts: Vec::new(),
            status: None,
            load_time_ms: None,
            final_url: None,
            title: None,
            page_state: None,
            failed_requests: Vec::new(),
            error_responses: Vec::new(),
        };

        if let Err(e) = self.diagnose_page(&session, target.as_str(), &mut report).await {
            warn!("Diagnostics for {} stopped early: {}", target, e);
        }

        let capture = session.close().await;
        report.failed_requests = capture.failures;
        report.error_responses = capture
            .responses
            .into_iter()
            .filter(|r| r.status >= 400)
            .collect();
        Ok(report)
    }

    async fn diagnose_page(
        &self,
        session: &Session,
        url: &str,
        report: &mut DiagnosticReport,
    ) -> Result<()> {
        let controller = NavigationController::new(&self.config);
        let page = session.page()?;

        for strategy in NavigationStrategy::diagnostic_ladder() {
            self.progress(format!("Trying '{}' navigation", strategy.name));
            let attempt = controller.attempt(page, url, &strategy).await;
            let reached = !matches!(attempt.outcome, AttemptOutcome::Failed { .. });
            debug!("Diagnostic strategy '{}' reached={}", strategy.name, reached);

            report.attempts.push(StrategyReport {
                strategy: attempt.strategy.clone(),
                reached,
                status: attempt.status(),
                error: attempt.error_message(),
                elapsed_ms: attempt.elapsed.as_millis() as u64,
            });

            if reached {
                report.status = attempt.status();
                report.load_time_ms = Some(attempt.elapsed.as_millis() as u64);
                break;
            }
        }

        if !report.reached() {
            return Ok(());
        }

        self.progress("Checking page readiness".to_string());
        let pipeline = ContentPipeline::new(&self.config);
        report.page_state = Some(pipeline.ensure_content(page).await);
        report.final_url = page.url().await.ok();
        report.title = page.title().await.ok();
        Ok(())
    }
}

fn parse_target(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url, scheme
        ))),
    }
}

//! Multi-strategy navigation with classified retries.

use crate::config::{CrawlerConfig, NavigationStrategy, PacingConfig};
use crate::driver::{NavigationResponse, PageDriver, WaitUntil};
use crate::error::{Result, ScanError};
use crate::session::Session;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What went wrong with a navigation attempt, as far as retry policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Tls,
    RateLimited,
    Timeout,
    Network,
    Http(u16),
    Other,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("ssl") || lower.contains("certificate") || lower.contains("err_cert") {
            FailureKind::Tls
        } else if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            FailureKind::RateLimited
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailureKind::Timeout
        } else if lower.contains("net::err_") {
            FailureKind::Network
        } else {
            FailureKind::Other
        }
    }

    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            FailureKind::RateLimited
        } else {
            FailureKind::Http(status)
        }
    }

    pub fn backoff_multiplier(&self) -> f64 {
        match self {
            FailureKind::RateLimited => 3.0,
            FailureKind::Tls => 2.0,
            FailureKind::Timeout => 1.5,
            _ => 1.0,
        }
    }
}

/// `min(attempt * base * multiplier + jitter, cap)`
pub fn retry_delay(
    attempt: u32,
    kind: FailureKind,
    base: Duration,
    jitter: Duration,
    cap: Duration,
) -> Duration {
    let scaled = base.mul_f64(attempt as f64 * kind.backoff_multiplier());
    (scaled + jitter).min(cap)
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Option<NavigationResponse>),
    HttpError(NavigationResponse),
    Failed { kind: FailureKind, message: String },
}

/// One strategy tried once. Only lives long enough to drive retry decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationAttempt {
    pub strategy: String,
    pub wait_until: WaitUntil,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

impl NavigationAttempt {
    pub fn status(&self) -> Option<u16> {
        match &self.outcome {
            AttemptOutcome::Success(resp) => resp.as_ref().map(|r| r.status),
            AttemptOutcome::HttpError(resp) => Some(resp.status),
            AttemptOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success(_))
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::HttpError(resp) => Some(format!("HTTP {}", resp.status)),
            AttemptOutcome::Failed { message, .. } => Some(message.clone()),
        }
    }

    fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::HttpError(resp) => Some(FailureKind::from_status(resp.status)),
            AttemptOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOutcome {
    pub strategy: String,
    pub response: Option<NavigationResponse>,
    pub attempts: u32,
}

pub struct NavigationController {
    strategies: Vec<NavigationStrategy>,
    max_retries: u32,
    pacing: PacingConfig,
}

impl NavigationController {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            strategies: config.strategies.clone(),
            max_retries: config.max_retries.max(1),
            pacing: config.pacing.clone(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<NavigationStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Try a single strategy once.
    pub async fn attempt(
        &self,
        page: &dyn PageDriver,
        url: &str,
        strategy: &NavigationStrategy,
    ) -> NavigationAttempt {
        let start = Instant::now();
        debug!(
            "Navigating to {} via '{}' ({:?}, {}ms)",
            url,
            strategy.name,
            strategy.wait_until,
            strategy.timeout.as_millis()
        );
        let outcome = match page.goto(url, strategy.wait_until, strategy.timeout).await {
            Ok(Some(resp))
                if resp.status == 403
                    || resp.status == 404
                    || resp.status == 429
                    || resp.status >= 500 =>
            {
                AttemptOutcome::HttpError(resp)
            }
            Ok(resp) => AttemptOutcome::Success(resp),
            Err(e) => {
                let message = e.to_string();
                AttemptOutcome::Failed {
                    kind: FailureKind::classify(&message),
                    message,
                }
            }
        };

        NavigationAttempt {
            strategy: strategy.name.clone(),
            wait_until: strategy.wait_until,
            timeout: strategy.timeout,
            elapsed: start.elapsed(),
            outcome,
        }
    }

    /// Walk the strategy ladder up to `max_retries` times. A 404 ends
    /// everything at once. A TLS failure on any strategy gets a fresh browser
    /// and the TLS backoff before the next try.
    pub async fn navigate(&self, session: &mut Session, url: &str) -> Result<NavigationOutcome> {
        let mut last: Option<NavigationAttempt> = None;

        for attempt in 1..=self.max_retries {
            info!("Navigation attempt {}/{} for {}", attempt, self.max_retries, url);
            let mut saw_tls = false;

            for strategy in &self.strategies {
                let page = session.page()?;
                let result = self.attempt(page, url, strategy).await;

                match &result.outcome {
                    AttemptOutcome::Success(response) => {
                        info!(
                            "Landed on {} with '{}' (status {})",
                            url,
                            strategy.name,
                            response
                                .as_ref()
                                .map(|r| r.status.to_string())
                                .unwrap_or_else(|| "n/a".to_string())
                        );
                        return Ok(NavigationOutcome {
                            strategy: strategy.name.clone(),
                            response: response.clone(),
                            attempts: attempt,
                        });
                    }
                    AttemptOutcome::HttpError(resp) if resp.status == 404 => {
                        warn!("{} returned 404, giving up", url);
                        return Err(ScanError::Navigation {
                            url: url.to_string(),
                            attempts: attempt,
                            last_strategy: strategy.name.clone(),
                            last_error: "HTTP 404 Not Found".to_string(),
                            terminal: true,
                        });
                    }
                    AttemptOutcome::HttpError(resp) if resp.status == 403 => {
                        warn!("403 from {} via '{}', evading", url, strategy.name);
                        self.evade_detection(page).await;
                    }
                    AttemptOutcome::HttpError(resp) if resp.status == 429 => {
                        warn!(
                            "429 from {}, pausing {}ms",
                            url,
                            self.pacing.rate_limit_pause.as_millis()
                        );
                        tokio::time::sleep(self.pacing.rate_limit_pause).await;
                    }
                    AttemptOutcome::HttpError(resp) => {
                        warn!("HTTP {} from {} via '{}'", resp.status, url, strategy.name);
                    }
                    AttemptOutcome::Failed { kind, message } => {
                        warn!("Strategy '{}' failed ({:?}): {}", strategy.name, kind, message);
                        saw_tls |= *kind == FailureKind::Tls;
                    }
                }
                last = Some(result);
            }

            if attempt < self.max_retries {
                let kind = if saw_tls {
                    FailureKind::Tls
                } else {
                    last.as_ref()
                        .and_then(NavigationAttempt::failure_kind)
                        .unwrap_or(FailureKind::Other)
                };
                if kind == FailureKind::Tls {
                    session.restart().await?;
                }
                let jitter = random_duration(Duration::ZERO, self.pacing.retry_jitter);
                let delay = retry_delay(
                    attempt,
                    kind,
                    self.pacing.retry_base,
                    jitter,
                    self.pacing.retry_cap,
                );
                info!("Retrying {} in {}ms", url, delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        let (last_strategy, last_error) = last
            .map(|a| {
                let message = a.error_message().unwrap_or_default();
                (a.strategy, message)
            })
            .unwrap_or_else(|| {
                (
                    "none".to_string(),
                    "no navigation strategies configured".to_string(),
                )
            });
        Err(ScanError::Navigation {
            url: url.to_string(),
            attempts: self.max_retries,
            last_strategy,
            last_error,
            terminal: false,
        })
    }

    /// Wiggle the pointer, scroll a little and idle like a reader would.
    async fn evade_detection(&self, page: &dyn PageDriver) {
        let (x, y, offset) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(100.0..900.0),
                rng.gen_range(100.0..700.0),
                rng.gen_range(0..100u32),
            )
        };
        if let Err(e) = page.mouse_move(x, y).await {
            debug!("Pointer move failed: {}", e);
        }
        tokio::time::sleep(random_duration(
            self.pacing.anti_detection_min,
            self.pacing.anti_detection_max,
        ))
        .await;
        if let Err(e) = page.evaluate(&format!("window.scrollTo(0, {})", offset)).await {
            debug!("Scroll failed: {}", e);
        }
    }
}

fn random_duration(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeLauncher, FakePage, GotoOutcome};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn session_with(page: FakePage, dir: &TempDir) -> (Session, FakeLauncher, CrawlerConfig) {
        let config = CrawlerConfig::default()
            .with_pacing(PacingConfig::zero())
            .with_capture_dir(dir.path());
        let launcher = FakeLauncher::new(page);
        let session = Session::start(Arc::new(launcher.clone()), Arc::new(config.clone()))
            .await
            .unwrap();
        (session, launcher, config)
    }

    #[test]
    fn test_classify_failures() {
        assert_eq!(FailureKind::classify("net::ERR_CERT_AUTHORITY_INVALID"), FailureKind::Tls);
        assert_eq!(FailureKind::classify("SSL handshake failed"), FailureKind::Tls);
        assert_eq!(FailureKind::classify("Navigation timed out after 8000ms"), FailureKind::Timeout);
        assert_eq!(FailureKind::classify("net::ERR_CONNECTION_RESET"), FailureKind::Network);
        assert_eq!(FailureKind::classify("Rate limit exceeded"), FailureKind::RateLimited);
        assert_eq!(FailureKind::classify("boom"), FailureKind::Other);
    }

    #[test]
    fn test_retry_delay_formula_and_cap() {
        let base = Duration::from_millis(2_000);
        let cap = Duration::from_millis(10_000);
        let jitter = Duration::from_millis(400);

        assert_eq!(retry_delay(1, FailureKind::Other, base, jitter, cap), Duration::from_millis(2_400));
        assert_eq!(retry_delay(1, FailureKind::Timeout, base, jitter, cap), Duration::from_millis(3_400));
        assert_eq!(retry_delay(2, FailureKind::Tls, base, jitter, cap), Duration::from_millis(8_400));
        assert_eq!(retry_delay(2, FailureKind::RateLimited, base, jitter, cap), cap);

        for attempt in 1..10 {
            for kind in [FailureKind::RateLimited, FailureKind::Tls, FailureKind::Timeout, FailureKind::Other] {
                let delay = retry_delay(attempt, kind, base, Duration::from_millis(999), cap);
                assert!(delay <= cap);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_strategy_success() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        let (mut session, _launcher, config) = session_with(page.clone(), &dir).await;

        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/")
            .await
            .unwrap();

        assert_eq!(outcome.strategy, "dom-ready");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(page.goto_calls().len(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_is_terminal_without_retries() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        page.default_goto(GotoOutcome::Status(404));
        let (mut session, _launcher, config) = session_with(page.clone(), &dir).await;

        let err = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/missing")
            .await
            .unwrap_err();

        assert!(err.is_terminal());
        assert_eq!(page.goto_calls().len(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_does_not_abort() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        page.plan_goto([GotoOutcome::Status(429), GotoOutcome::Status(200)]);
        let (mut session, _launcher, mut config) = session_with(page.clone(), &dir).await;
        config.pacing.rate_limit_pause = Duration::from_secs(5);

        let start = Instant::now();
        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/")
            .await
            .unwrap();

        assert_eq!(outcome.strategy, "full-load");
        assert!(start.elapsed() >= Duration::from_secs(5));
        let waits: Vec<WaitUntil> = page.goto_calls().into_iter().map(|(_, w)| w).collect();
        assert_eq!(waits, vec![WaitUntil::DomContentLoaded, WaitUntil::Load]);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_403_triggers_evasion_and_continues() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        page.plan_goto([GotoOutcome::Status(403), GotoOutcome::Status(403), GotoOutcome::Status(200)]);
        let (mut session, _launcher, config) = session_with(page.clone(), &dir).await;

        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/")
            .await
            .unwrap();

        assert_eq!(outcome.strategy, "network-idle");
        assert_eq!(page.mouse_moves(), 2);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_exhausts_every_strategy() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        page.default_goto(GotoOutcome::Status(503));
        let (mut session, _launcher, config) = session_with(page.clone(), &dir).await;

        let err = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/")
            .await
            .unwrap_err();

        assert_eq!(page.goto_calls().len(), 3 * 4);
        match err {
            ScanError::Navigation {
                attempts,
                last_strategy,
                last_error,
                terminal,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_strategy, "commit");
                assert_eq!(last_error, "HTTP 503");
                assert!(!terminal);
            }
            other => panic!("unexpected error: {other}"),
        }
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tls_failure_restarts_browser() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        let tls = GotoOutcome::Error("net::ERR_CERT_DATE_INVALID".to_string());
        page.plan_goto(vec![tls; 4]);
        let (mut session, launcher, config) = session_with(page.clone(), &dir).await;

        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://expired.example.com/")
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(launcher.launches(), 2);
        assert_eq!(session.restarts(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tls_on_any_strategy_restarts_browser() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        let tls = GotoOutcome::Error("net::ERR_CERT_AUTHORITY_INVALID".to_string());
        page.plan_goto([
            tls.clone(),
            tls.clone(),
            tls,
            GotoOutcome::Error("Navigation timed out after 8000ms".to_string()),
        ]);
        let (mut session, launcher, mut config) = session_with(page.clone(), &dir).await;
        config.pacing.retry_base = Duration::from_millis(1_000);
        config.pacing.retry_jitter = Duration::ZERO;
        config.pacing.retry_cap = Duration::from_secs(60);

        let start = Instant::now();
        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://self-signed.example.com/")
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(launcher.launches(), 2);
        assert_eq!(session.restarts(), 1);
        // TLS backoff is 2x the base, a plain timeout only 1.5x.
        assert!(start.elapsed() >= Duration::from_millis(2_000));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_response_counts_as_success() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new();
        page.default_goto(GotoOutcome::NoResponse);
        let (mut session, _launcher, config) = session_with(page, &dir).await;

        let outcome = NavigationController::new(&config)
            .navigate(&mut session, "https://example.com/")
            .await
            .unwrap();
        assert!(outcome.response.is_none());
        session.close().await;
    }
}

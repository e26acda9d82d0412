pub mod activation;
pub mod capture;
pub mod chromium;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod driver;
pub mod error;
pub mod navigation;
pub mod readiness;
pub mod result;
pub mod routes;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod fake;

pub use activation::{ActivationTier, ContentActivator, ContentPipeline};
pub use chromium::ChromiumLauncher;
pub use classifier::{classify, is_api_url, url_type};
pub use config::{CrawlerConfig, NavigationStrategy, PacingConfig};
pub use crawler::{Crawler, ProgressCallback};
pub use driver::{BrowserLauncher, PageDriver, WaitUntil};
pub use error::{DriverError, ScanError};
pub use navigation::NavigationController;
pub use readiness::ReadinessDetector;
pub use result::{
    AccessibilityReport, CapturedResponse, CapturedScript, CrawlResult, DiagnosticReport,
    FailedRequest, PageState, StrategyReport, UrlType, VisitedRoute,
};
pub use routes::RouteExplorer;
pub use store::{CaptureStore, StoredScript};

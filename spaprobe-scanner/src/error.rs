use thiserror::Error;

/// Errors raised by a page driver. These never escape a crawl directly;
/// navigation folds them into [`ScanError::Navigation`] and every other
/// component logs and swallows them.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("No element matches {selector} at index {index}")]
    ElementNotFound { selector: String, index: usize },

    #[error("Page is closed")]
    Closed,

    #[error("CDP error: {0}")]
    Protocol(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Browser error: {0}")]
    Browser(#[from] DriverError),

    #[error(
        "Navigation to {url} failed after {attempts} attempt(s) (last strategy: {last_strategy}): {last_error}"
    )]
    Navigation {
        url: String,
        attempts: u32,
        last_strategy: String,
        last_error: String,
        /// Set when the target answered 404; no retries were made.
        terminal: bool,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScanError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanError::Navigation { terminal: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

//! Crawler configuration.
//!
//! Every delay and timeout the engine uses lives here as a named field so a
//! config file (or a test) can reshape the pacing without touching code.
//! Durations are (de)serialized as integer milliseconds.

use crate::driver::WaitUntil;
use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One rung of the navigation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStrategy {
    pub name: String,
    pub wait_until: WaitUntil,
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl NavigationStrategy {
    pub fn new(name: &str, wait_until: WaitUntil, timeout_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            wait_until,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// dom-ready, full-load, network-idle, commit.
    pub fn default_ladder() -> Vec<Self> {
        vec![
            Self::new("dom-ready", WaitUntil::DomContentLoaded, 12_000),
            Self::new("full-load", WaitUntil::Load, 18_000),
            Self::new("network-idle", WaitUntil::NetworkIdle, 25_000),
            Self::new("commit", WaitUntil::Commit, 8_000),
        ]
    }

    /// Ladder used by the network diagnostics probe.
    pub fn diagnostic_ladder() -> Vec<Self> {
        vec![
            Self::new("dom-ready", WaitUntil::DomContentLoaded, 10_000),
            Self::new("commit", WaitUntil::Commit, 15_000),
            Self::new("full-load", WaitUntil::Load, 20_000),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// First detection window after landing.
    #[serde(with = "millis")]
    pub initial_wait: Duration,
    /// Detection window after the JS trigger tier.
    #[serde(with = "millis")]
    pub secondary_wait: Duration,
    /// Detection window after the aggressive tier.
    #[serde(with = "millis")]
    pub final_wait: Duration,
    #[serde(with = "millis")]
    pub body_timeout: Duration,
    /// Used by route exploration when a click changed content but not the URL.
    #[serde(with = "millis")]
    pub route_check_wait: Duration,
    /// Used by the quick accessibility check.
    #[serde(with = "millis")]
    pub quick_check_wait: Duration,
    /// A document still loading after this long is reported as an error.
    #[serde(with = "millis")]
    pub document_deadline: Duration,
    pub stability_threshold: f64,
    pub required_stable_polls: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            initial_wait: Duration::from_millis(15_000),
            secondary_wait: Duration::from_millis(8_000),
            final_wait: Duration::from_millis(5_000),
            body_timeout: Duration::from_millis(5_000),
            route_check_wait: Duration::from_millis(3_000),
            quick_check_wait: Duration::from_millis(8_000),
            document_deadline: Duration::from_millis(10_000),
            stability_threshold: 5.0,
            required_stable_polls: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub families: Vec<String>,
    pub per_family: usize,
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Only URL changes matching this regex count as route changes.
    pub expected_pattern: Option<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            families: [
                r##"a[href^="#"]"##,
                r#"a[href^="/"]"#,
                "[data-route]",
                ".nav-link",
                ".menu-item",
                ".router-link",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            per_family: 2,
            timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(500),
            expected_pattern: None,
        }
    }
}

impl RouteConfig {
    pub fn budget(&self) -> usize {
        self.families.len() * self.per_family
    }
}

/// Named pauses and waits. Tests swap in [`PacingConfig::zero`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    #[serde(with = "millis")]
    pub rate_limit_pause: Duration,
    #[serde(with = "millis")]
    pub anti_detection_min: Duration,
    #[serde(with = "millis")]
    pub anti_detection_max: Duration,
    #[serde(with = "millis")]
    pub retry_base: Duration,
    #[serde(with = "millis")]
    pub retry_jitter: Duration,
    #[serde(with = "millis")]
    pub retry_cap: Duration,
    #[serde(with = "millis")]
    pub scroll_pause: Duration,
    #[serde(with = "millis")]
    pub framework_wait: Duration,
    #[serde(with = "millis")]
    pub text_wait: Duration,
    #[serde(with = "millis")]
    pub entry_click_settle: Duration,
    #[serde(with = "millis")]
    pub aggressive_bottom_pause: Duration,
    #[serde(with = "millis")]
    pub aggressive_random_pause: Duration,
    #[serde(with = "millis")]
    pub hover_settle: Duration,
    #[serde(with = "millis")]
    pub key_pause: Duration,
    #[serde(with = "millis")]
    pub sweep_step: Duration,
    #[serde(with = "millis")]
    pub sweep_settle: Duration,
    #[serde(with = "millis")]
    pub click_pause: Duration,
    #[serde(with = "millis")]
    pub route_settle: Duration,
    #[serde(with = "millis")]
    pub route_back_pause: Duration,
    #[serde(with = "millis")]
    pub route_change_pause: Duration,
    #[serde(with = "millis")]
    pub search_type_pause: Duration,
    #[serde(with = "millis")]
    pub search_submit_pause: Duration,
    /// Upper bound for a single activation step.
    #[serde(with = "millis")]
    pub step_timeout: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        let ms = Duration::from_millis;
        Self {
            rate_limit_pause: ms(5_000),
            anti_detection_min: ms(1_000),
            anti_detection_max: ms(3_000),
            retry_base: ms(2_000),
            retry_jitter: ms(1_000),
            retry_cap: ms(10_000),
            scroll_pause: ms(1_000),
            framework_wait: ms(3_000),
            text_wait: ms(5_000),
            entry_click_settle: ms(2_000),
            aggressive_bottom_pause: ms(1_500),
            aggressive_random_pause: ms(1_000),
            hover_settle: ms(1_000),
            key_pause: ms(500),
            sweep_step: ms(800),
            sweep_settle: ms(2_000),
            click_pause: ms(1_500),
            route_settle: ms(2_000),
            route_back_pause: ms(1_000),
            route_change_pause: ms(1_000),
            search_type_pause: ms(1_000),
            search_submit_pause: ms(2_000),
            step_timeout: ms(15_000),
        }
    }
}

impl PacingConfig {
    pub fn zero() -> Self {
        Self {
            rate_limit_pause: Duration::ZERO,
            anti_detection_min: Duration::ZERO,
            anti_detection_max: Duration::ZERO,
            retry_base: Duration::ZERO,
            retry_jitter: Duration::ZERO,
            retry_cap: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            framework_wait: Duration::ZERO,
            text_wait: Duration::ZERO,
            entry_click_settle: Duration::ZERO,
            aggressive_bottom_pause: Duration::ZERO,
            aggressive_random_pause: Duration::ZERO,
            hover_settle: Duration::ZERO,
            key_pause: Duration::ZERO,
            sweep_step: Duration::ZERO,
            sweep_settle: Duration::ZERO,
            click_pause: Duration::ZERO,
            route_settle: Duration::ZERO,
            route_back_pause: Duration::ZERO,
            route_change_pause: Duration::ZERO,
            search_type_pause: Duration::ZERO,
            search_submit_pause: Duration::ZERO,
            step_timeout: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_retries: u32,
    pub strategies: Vec<NavigationStrategy>,
    pub readiness: ReadinessConfig,
    pub routes: RouteConfig,
    pub pacing: PacingConfig,
    pub capture_dir: PathBuf,
    pub accept_language: String,
    pub user_agent: Option<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_executable: Option<PathBuf>,
    /// Run the dynamic-content pass (sweeps, clicks, routes, search form).
    pub explore: bool,
    /// Bound on everything after the page has landed.
    #[serde(with = "option_millis")]
    pub crawl_deadline: Option<Duration>,
    pub event_buffer: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategies: NavigationStrategy::default_ladder(),
            readiness: ReadinessConfig::default(),
            routes: RouteConfig::default(),
            pacing: PacingConfig::default(),
            capture_dir: PathBuf::from("captures"),
            accept_language: "en-US,en;q=0.9".to_string(),
            user_agent: None,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            chrome_executable: None,
            explore: true,
            crawl_deadline: Some(Duration::from_secs(180)),
            event_buffer: 1024,
        }
    }
}

impl CrawlerConfig {
    /// Load a (possibly partial) JSON config. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = dir.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_explore(mut self, explore: bool) -> Self {
        self.explore = explore;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod option_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

//! Heuristic page-readiness detection.
//!
//! A single probe script gathers raw DOM counters; scoring, framework
//! detection and stability tracking all happen on this side of the boundary.

use crate::config::ReadinessConfig;
use crate::driver::PageDriver;
use crate::error::{DriverError, DriverResult};
use crate::result::PageState;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub const LOADING_SELECTORS: &[&str] = &[
    r#"[class*="loading"]"#,
    r#"[class*="spinner"]"#,
    r#"[class*="skeleton"]"#,
    r#"[id*="loading"]"#,
    r#"[id*="spinner"]"#,
    ".loading",
    ".spinner",
    r#"[aria-label*="loading" i]"#,
    r#"[aria-label*="加载" i]"#,
    ".ant-spin",
    ".el-loading-mask",
    ".v-progress-circular",
];

const MIN_POLL: Duration = Duration::from_millis(10);
const WAIT_POLL: Duration = Duration::from_millis(100);

static PROBE_SCRIPT: LazyLock<String> = LazyLock::new(|| {
    let selectors = serde_json::to_string(LOADING_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const has = (sel) => {{ try {{ return !!document.querySelector(sel); }} catch (e) {{ return false; }} }};
  const body = document.body;
  const text = body ? (body.innerText || '') : '';
  const all = document.getElementsByTagName('*');
  const loading = [];
  for (const sel of {selectors}) {{ if (has(sel)) loading.push(sel); }}
  let dynamicElements = 0;
  let vueScoped = 0;
  const limit = Math.min(all.length, 5000);
  for (let i = 0; i < limit; i++) {{
    const names = all[i].getAttributeNames();
    let dynamic = false;
    for (const n of names) {{
      if (n.startsWith('data-v-')) {{ vueScoped++; dynamic = true; break; }}
      if (n.startsWith('data-react') || n.startsWith('ng-')) {{ dynamic = true; break; }}
    }}
    if (dynamic) dynamicElements++;
  }}
  return {{
    readyState: document.readyState,
    textLength: text.length,
    trimmedTextLength: text.trim().length,
    htmlLength: document.documentElement ? document.documentElement.outerHTML.length : 0,
    elementCount: all.length,
    loadingIndicators: loading,
    hasReact: !!window.React || has('[data-reactroot], #react-root, #root [data-react]'),
    hasVue: !!window.Vue || !!window.__VUE__ || vueScoped > 0,
    hasAngular: !!window.ng || has('[ng-app], [ng-controller], [ng-version]'),
    dynamicElements
  }};
}})()"#
    )
});

pub fn probe_script() -> &'static str {
    PROBE_SCRIPT.as_str()
}

/// Raw counters returned by the probe script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomSnapshot {
    pub ready_state: String,
    pub text_length: u64,
    pub trimmed_text_length: u64,
    pub html_length: u64,
    pub element_count: u64,
    pub loading_indicators: Vec<String>,
    pub has_react: bool,
    pub has_vue: bool,
    pub has_angular: bool,
    pub dynamic_elements: u64,
}

impl DomSnapshot {
    pub fn is_complete(&self) -> bool {
        self.ready_state == "complete"
    }

    pub fn is_blank(&self) -> bool {
        self.trimmed_text_length < 10 && self.element_count < 10
    }

    pub fn has_content(&self) -> bool {
        !self.is_blank() && self.text_length > 50
    }

    pub fn is_js_rendered(&self) -> bool {
        self.has_react || self.has_vue || self.has_angular || self.dynamic_elements > 0
    }

    pub fn content_score(&self) -> f64 {
        content_score(self.text_length, self.element_count, self.html_length)
    }
}

/// `min(text/100, 50) + min(nodes/10, 30) + min(html/1000, 20)`
pub fn content_score(text_length: u64, element_count: u64, html_length: u64) -> f64 {
    (text_length as f64 / 100.0).min(50.0)
        + (element_count as f64 / 10.0).min(30.0)
        + (html_length as f64 / 1000.0).min(20.0)
}

/// Counts consecutive polls whose score moved less than the threshold.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    previous: f64,
    count: u32,
    threshold: f64,
    required: u32,
}

impl StabilityTracker {
    pub fn new(threshold: f64, required: u32) -> Self {
        Self {
            previous: 0.0,
            count: 0,
            threshold,
            required,
        }
    }

    /// Feed one score; returns the updated consecutive count.
    pub fn observe(&mut self, score: f64) -> u32 {
        if (score - self.previous).abs() < self.threshold {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.previous = score;
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_settled(&self) -> bool {
        self.count >= self.required
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    config: ReadinessConfig,
}

impl ReadinessDetector {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Poll the page until it is stable with content or `max_wait` runs out.
    /// Never fails: probe failures end the loop and show up in `errors`.
    pub async fn detect(&self, page: &dyn PageDriver, max_wait: Duration) -> PageState {
        let start = Instant::now();
        let poll = self.config.poll_interval.max(MIN_POLL);
        let mut tracker = StabilityTracker::new(
            self.config.stability_threshold,
            self.config.required_stable_polls,
        );
        let mut errors: Vec<String> = Vec::new();
        let mut state = PageState::default();

        loop {
            match probe(page).await {
                Ok(snapshot) => {
                    let observed = self.assess(&snapshot, &mut tracker, start.elapsed());
                    for error in &observed.errors {
                        if !errors.contains(error) {
                            errors.push(error.clone());
                        }
                    }
                    trace!(
                        "Readiness poll: score={:.1} stable_count={} content={}",
                        observed.content_score,
                        tracker.count(),
                        observed.has_content
                    );
                    state = observed;
                    if state.is_stable && state.has_content {
                        break;
                    }
                }
                Err(e) => {
                    let error = format!("detection failed: {}", e);
                    if !errors.contains(&error) {
                        errors.push(error);
                    }
                    break;
                }
            }

            tokio::time::sleep(poll).await;
            if start.elapsed() >= max_wait {
                break;
            }
        }

        state.errors = errors;
        debug!(
            "Page state: content={} js={} stable={} score={:.1} errors={}",
            state.has_content,
            state.is_js_rendered,
            state.is_stable,
            state.content_score,
            state.errors.len()
        );
        state
    }

    /// Turn one snapshot into a state, advancing the stability tracker.
    pub fn assess(
        &self,
        snapshot: &DomSnapshot,
        tracker: &mut StabilityTracker,
        elapsed: Duration,
    ) -> PageState {
        let score = snapshot.content_score();
        tracker.observe(score);

        let mut errors = Vec::new();
        if snapshot.text_length < 10 {
            errors.push("too little text content".to_string());
        }
        if snapshot.element_count < 5 {
            errors.push("too few DOM elements".to_string());
        }
        if !snapshot.is_complete() && elapsed >= self.config.document_deadline {
            errors.push(format!(
                "document not complete after {}s",
                self.config.document_deadline.as_secs()
            ));
        }

        PageState {
            has_content: snapshot.has_content(),
            is_js_rendered: snapshot.is_js_rendered(),
            is_stable: tracker.is_settled()
                && snapshot.loading_indicators.is_empty()
                && snapshot.is_complete(),
            content_score: score,
            errors,
            loading_indicators: snapshot.loading_indicators.clone(),
        }
    }
}

pub async fn probe(page: &dyn PageDriver) -> DriverResult<DomSnapshot> {
    let value = page.evaluate(probe_script()).await?;
    serde_json::from_value(value).map_err(|e| DriverError::Evaluation(e.to_string()))
}

/// Poll a boolean expression until it is true. Returns false on timeout
/// or when evaluation keeps failing.
pub async fn wait_for_script(page: &dyn PageDriver, script: &str, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if let Ok(serde_json::Value::Bool(true)) = page.evaluate(script).await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(WAIT_POLL.min(timeout)).await;
    }
}

/// Wait until at least one element matches `selector`.
pub async fn wait_for_selector(page: &dyn PageDriver, selector: &str, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if matches!(page.count(selector).await, Ok(n) if n > 0) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(WAIT_POLL.min(timeout)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakePage, snapshot_with};

    #[test]
    fn test_content_score_caps() {
        assert_eq!(content_score(0, 0, 0), 0.0);
        assert_eq!(content_score(2_000, 100, 5_000), 20.0 + 10.0 + 5.0);
        assert_eq!(content_score(1_000_000, 1_000_000, 1_000_000), 100.0);
    }

    #[test]
    fn test_stability_sequence() {
        let mut tracker = StabilityTracker::new(5.0, 3);
        let counts: Vec<u32> = [10.0, 60.0, 61.0, 62.0, 63.0]
            .into_iter()
            .map(|s| tracker.observe(s))
            .collect();
        assert_eq!(counts, vec![0, 0, 1, 2, 3]);
        assert!(tracker.is_settled());

        assert_eq!(tracker.observe(80.0), 0);
        assert!(!tracker.is_settled());
    }

    #[test]
    fn test_blank_and_content_flags() {
        let blank = snapshot_with(5, 3, 200);
        assert!(blank.is_blank());
        assert!(!blank.has_content());

        let thin = snapshot_with(40, 30, 2_000);
        assert!(!thin.is_blank());
        assert!(!thin.has_content(), "needs more than 50 chars");

        let full = snapshot_with(2_000, 100, 8_000);
        assert!(full.has_content());
    }

    #[test]
    fn test_js_rendered_markers() {
        let mut snapshot = snapshot_with(100, 20, 1_000);
        assert!(!snapshot.is_js_rendered());
        snapshot.dynamic_elements = 3;
        assert!(snapshot.is_js_rendered());
        snapshot.dynamic_elements = 0;
        snapshot.has_angular = true;
        assert!(snapshot.is_js_rendered());
    }

    #[test]
    fn test_loading_indicator_blocks_stability() {
        let detector = ReadinessDetector::new(ReadinessConfig::default());
        let mut tracker = StabilityTracker::new(5.0, 3);
        let mut snapshot = snapshot_with(2_000, 100, 8_000);
        snapshot.loading_indicators = vec![".spinner".to_string()];
        let mut state = PageState::default();
        for _ in 0..5 {
            state = detector.assess(&snapshot, &mut tracker, Duration::ZERO);
        }
        assert!(!state.is_stable);
        assert_eq!(state.loading_indicators, vec![".spinner".to_string()]);
    }

    #[test]
    fn test_document_deadline_error() {
        let detector = ReadinessDetector::new(ReadinessConfig::default());
        let mut tracker = StabilityTracker::new(5.0, 3);
        let mut snapshot = snapshot_with(2_000, 100, 8_000);
        snapshot.ready_state = "interactive".to_string();

        let early = detector.assess(&snapshot, &mut tracker, Duration::from_secs(2));
        assert!(early.errors.is_empty());
        let late = detector.assess(&snapshot, &mut tracker, Duration::from_secs(11));
        assert_eq!(late.errors, vec!["document not complete after 10s".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_static_page_is_stable_with_content() {
        let page = FakePage::new();
        page.push_snapshot(snapshot_with(2_000, 100, 8_000));
        let detector = ReadinessDetector::new(ReadinessConfig::default());

        let state = detector.detect(&page, Duration::from_secs(15)).await;

        assert!(state.has_content);
        assert!(state.is_stable);
        assert!(state.errors.is_empty());
        // The first poll jumps from the zero baseline; three equal polls follow.
        assert_eq!(page.probe_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_accumulates_errors_and_times_out() {
        let page = FakePage::new();
        page.push_snapshot(snapshot_with(0, 3, 100));
        let detector = ReadinessDetector::new(ReadinessConfig::default());

        let state = detector.detect(&page, Duration::from_secs(5)).await;

        assert!(!state.has_content);
        assert_eq!(
            state.errors,
            vec!["too little text content".to_string(), "too few DOM elements".to_string()]
        );
        assert_eq!(page.probe_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_probe_failure_is_recorded() {
        let page = FakePage::new();
        page.fail_probes();
        let detector = ReadinessDetector::new(ReadinessConfig::default());

        let state = detector.detect(&page, Duration::from_secs(5)).await;

        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].starts_with("detection failed:"));
        assert_eq!(page.probe_count(), 1);
    }
}

//! Tiered content activation.
//!
//! Tiers are plain data: an ordered list of steps, each with its own time
//! bound, executed by a single runner. Every failure is logged and skipped.

use crate::config::{CrawlerConfig, PacingConfig};
use crate::driver::{Key, PageDriver};
use crate::error::DriverResult;
use crate::readiness::{wait_for_script, wait_for_selector, ReadinessDetector};
use crate::result::{now_millis, PageState};
use crate::store::CaptureStore;
use futures::future::select_ok;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_SWEEP_STEPS: u64 = 50;

const DISPATCH_EVENTS_SCRIPT: &str = r#"(() => {
  for (const t of ['resize', 'load', 'DOMContentLoaded']) {
    try { window.dispatchEvent(new Event(t)); } catch (e) {}
  }
  try { document.dispatchEvent(new Event('DOMContentLoaded')); } catch (e) {}
  document.dispatchEvent(new MouseEvent('mousemove', {
    clientX: window.innerWidth / 2, clientY: window.innerHeight / 2, bubbles: true
  }));
  return true;
})()"#;

const PAGE_METRICS_SCRIPT: &str =
    "[document.body ? document.body.scrollHeight : 0, window.innerHeight || 0]";

pub const ENTRY_POINT_SELECTORS: &[&str] = &[
    r#"button[class*="start"]"#,
    r#"button[class*="enter"]"#,
    r#"button[class*="continue"]"#,
    r#"a[class*="start"]"#,
    r#"a[class*="enter"]"#,
    r#"a[class*="continue"]"#,
    ".start-btn",
    ".enter-btn",
    ".continue-btn",
    r#"[data-testid*="start"]"#,
    r#"[data-testid*="enter"]"#,
];

pub const INTERACTIVE_SELECTORS: &[&str] = &[
    "button:not([disabled])",
    r##"a[href*="#"]"##,
    ".tab",
    ".tabs button",
    r#"[role="tab"]"#,
    ".load-more",
    ".show-more",
    "[data-toggle]",
    "[data-show]",
    ".expand",
    ".collapse",
];

pub const SEARCH_SELECTORS: &[&str] = &[
    r#"input[type="search"]"#,
    r#"input[placeholder*="search" i]"#,
    ".search-input",
    "#search",
];

const MAIN_REGION_SELECTOR: &str = "main, .main, #main, .content, #content";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    Top,
    Bottom,
    ViewportHeight,
    /// A random point within the first viewport.
    RandomFraction,
}

impl ScrollTarget {
    fn script(&self) -> String {
        match self {
            ScrollTarget::Top => "window.scrollTo(0, 0)".to_string(),
            ScrollTarget::Bottom => {
                "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)".to_string()
            }
            ScrollTarget::ViewportHeight => "window.scrollTo(0, window.innerHeight)".to_string(),
            ScrollTarget::RandomFraction => {
                let fraction: f64 = rand::thread_rng().gen_range(0.0..1.0);
                format!("window.scrollTo(0, window.innerHeight * {:.3})", fraction)
            }
        }
    }
}

/// A boolean page condition raced against its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitProbe {
    pub name: String,
    pub script: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Scroll(ScrollTarget),
    /// Scroll to the bottom one viewport at a time, then back to the top.
    ScrollSweep { step_pause: Duration },
    DispatchEvents,
    Pause(Duration),
    /// First probe to succeed wins; losing every race is not an error.
    RaceWaits(Vec<WaitProbe>),
    ClickFirstVisible { selectors: Vec<String> },
    ClickVisible {
        selectors: Vec<String>,
        max_per_selector: usize,
        pause: Duration,
    },
    Hover { selector: String },
    PressKey(Key),
    /// Type into the first visible field, submit, then clear it.
    Search {
        selectors: Vec<String>,
        query: String,
        type_pause: Duration,
        submit_pause: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivationStep {
    pub action: StepAction,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivationTier {
    pub name: String,
    pub steps: Vec<ActivationStep>,
}

/// Step counts from one tier run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierOutcome {
    pub completed: usize,
    pub failed: usize,
}

struct TierBuilder<'a> {
    name: &'static str,
    pacing: &'a PacingConfig,
    steps: Vec<ActivationStep>,
}

impl<'a> TierBuilder<'a> {
    fn new(name: &'static str, pacing: &'a PacingConfig) -> Self {
        Self {
            name,
            pacing,
            steps: Vec::new(),
        }
    }

    fn step(mut self, action: StepAction) -> Self {
        let timeout = match &action {
            StepAction::Pause(d) => *d + self.pacing.step_timeout,
            StepAction::RaceWaits(probes) => {
                probes.iter().map(|p| p.timeout).max().unwrap_or_default() + self.pacing.step_timeout
            }
            StepAction::ScrollSweep { step_pause } => {
                *step_pause * MAX_SWEEP_STEPS as u32 + self.pacing.step_timeout
            }
            StepAction::ClickVisible {
                selectors,
                max_per_selector,
                pause,
            } => {
                let clicks = (selectors.len() * max_per_selector) as u32;
                *pause * clicks + self.pacing.step_timeout * clicks.max(1)
            }
            StepAction::Search {
                type_pause,
                submit_pause,
                ..
            } => *type_pause + *submit_pause + self.pacing.step_timeout,
            _ => self.pacing.step_timeout,
        };
        self.steps.push(ActivationStep { action, timeout });
        self
    }

    fn pause(self, d: Duration) -> Self {
        self.step(StepAction::Pause(d))
    }

    fn build(self) -> ActivationTier {
        ActivationTier {
            name: self.name.to_string(),
            steps: self.steps,
        }
    }
}

fn owned(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}

impl ActivationTier {
    /// Nudge frameworks that render lazily: scroll, replay lifecycle events,
    /// then race for any sign of a rendered app.
    pub fn trigger_js_content(pacing: &PacingConfig) -> Self {
        TierBuilder::new("trigger-js-content", pacing)
            .step(StepAction::Scroll(ScrollTarget::ViewportHeight))
            .pause(pacing.scroll_pause)
            .step(StepAction::Scroll(ScrollTarget::Top))
            .pause(pacing.scroll_pause)
            .step(StepAction::DispatchEvents)
            .step(StepAction::RaceWaits(vec![
                WaitProbe {
                    name: "react-root".to_string(),
                    script: "!!document.querySelector('[data-reactroot], #react-root, #root > div')"
                        .to_string(),
                    timeout: pacing.framework_wait,
                },
                WaitProbe {
                    name: "vue-scoped".to_string(),
                    script: "Array.from(document.getElementsByTagName('*')).slice(0, 5000).some(e => e.getAttributeNames().some(n => n.startsWith('data-v-')))"
                        .to_string(),
                    timeout: pacing.framework_wait,
                },
                WaitProbe {
                    name: "body-text".to_string(),
                    script: "!!document.body && document.body.innerText.length > 100".to_string(),
                    timeout: pacing.text_wait,
                },
            ]))
            .build()
    }

    /// Last resort: click an entry point, scroll hard, hover, poke the keyboard.
    pub fn aggressive(pacing: &PacingConfig) -> Self {
        let mut builder = TierBuilder::new("aggressive", pacing)
            .step(StepAction::ClickFirstVisible {
                selectors: owned(ENTRY_POINT_SELECTORS),
            })
            .pause(pacing.entry_click_settle);
        for _ in 0..3 {
            builder = builder
                .step(StepAction::Scroll(ScrollTarget::Bottom))
                .pause(pacing.aggressive_bottom_pause)
                .step(StepAction::Scroll(ScrollTarget::RandomFraction))
                .pause(pacing.aggressive_random_pause);
        }
        builder
            .step(StepAction::Hover {
                selector: MAIN_REGION_SELECTOR.to_string(),
            })
            .pause(pacing.hover_settle)
            .step(StepAction::PressKey(Key::Tab))
            .pause(pacing.key_pause)
            .step(StepAction::PressKey(Key::Escape))
            .pause(pacing.key_pause)
            .build()
    }

    pub fn scroll_sweep(pacing: &PacingConfig) -> Self {
        TierBuilder::new("scroll-sweep", pacing)
            .step(StepAction::ScrollSweep {
                step_pause: pacing.sweep_step,
            })
            .pause(pacing.sweep_settle)
            .build()
    }

    pub fn interactive_clicks(pacing: &PacingConfig) -> Self {
        TierBuilder::new("interactive-clicks", pacing)
            .step(StepAction::ClickVisible {
                selectors: owned(INTERACTIVE_SELECTORS),
                max_per_selector: 3,
                pause: pacing.click_pause,
            })
            .build()
    }

    pub fn search_form(pacing: &PacingConfig) -> Self {
        TierBuilder::new("search-form", pacing)
            .step(StepAction::Search {
                selectors: owned(SEARCH_SELECTORS),
                query: "test".to_string(),
                type_pause: pacing.search_type_pause,
                submit_pause: pacing.search_submit_pause,
            })
            .build()
    }
}

/// Runs activation tiers against a page.
#[derive(Debug, Clone)]
pub struct ContentActivator {
    js_tier: ActivationTier,
    aggressive_tier: ActivationTier,
}

impl ContentActivator {
    pub fn new(pacing: &PacingConfig) -> Self {
        Self {
            js_tier: ActivationTier::trigger_js_content(pacing),
            aggressive_tier: ActivationTier::aggressive(pacing),
        }
    }

    /// Replace the two escalation tiers.
    pub fn with_tiers(mut self, js_tier: ActivationTier, aggressive_tier: ActivationTier) -> Self {
        self.js_tier = js_tier;
        self.aggressive_tier = aggressive_tier;
        self
    }

    pub fn js_tier(&self) -> &ActivationTier {
        &self.js_tier
    }

    pub fn aggressive_tier(&self) -> &ActivationTier {
        &self.aggressive_tier
    }

    pub async fn run_tier(&self, page: &dyn PageDriver, tier: &ActivationTier) -> TierOutcome {
        debug!("Running activation tier '{}' ({} steps)", tier.name, tier.steps.len());
        let mut outcome = TierOutcome::default();

        for step in &tier.steps {
            match tokio::time::timeout(step.timeout, run_step(page, &step.action)).await {
                Ok(Ok(())) => outcome.completed += 1,
                Ok(Err(e)) => {
                    warn!("Activation step {:?} in '{}' failed: {}", step.action, tier.name, e);
                    outcome.failed += 1;
                }
                Err(_) => {
                    warn!(
                        "Activation step {:?} in '{}' timed out after {}ms",
                        step.action,
                        tier.name,
                        step.timeout.as_millis()
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

async fn run_step(page: &dyn PageDriver, action: &StepAction) -> DriverResult<()> {
    match action {
        StepAction::Scroll(target) => {
            page.evaluate(&target.script()).await?;
        }
        StepAction::ScrollSweep { step_pause } => scroll_sweep(page, *step_pause).await?,
        StepAction::DispatchEvents => {
            page.evaluate(DISPATCH_EVENTS_SCRIPT).await?;
        }
        StepAction::Pause(d) => tokio::time::sleep(*d).await,
        StepAction::RaceWaits(probes) if probes.is_empty() => {}
        StepAction::RaceWaits(probes) => {
            let races = probes.iter().map(|probe| {
                Box::pin(async move {
                    if wait_for_script(page, &probe.script, probe.timeout).await {
                        Ok(probe.name.as_str())
                    } else {
                        Err(())
                    }
                })
            });
            match select_ok(races).await {
                Ok((winner, _)) => debug!("Content signal: {}", winner),
                Err(()) => debug!("No content signal before timeout"),
            }
        }
        StepAction::ClickFirstVisible { selectors } => {
            for selector in selectors {
                if let Some(index) = first_visible(page, selector).await {
                    info!("Clicking entry point {}", selector);
                    page.click(selector, index).await?;
                    return Ok(());
                }
            }
            debug!("No visible entry point");
        }
        StepAction::ClickVisible {
            selectors,
            max_per_selector,
            pause,
        } => {
            for selector in selectors {
                let count = page.count(selector).await.unwrap_or(0);
                let mut clicked = 0;
                for index in 0..count {
                    if clicked >= *max_per_selector {
                        break;
                    }
                    if !page.is_visible(selector, index).await.unwrap_or(false) {
                        continue;
                    }
                    match page.click(selector, index).await {
                        Ok(()) => {
                            clicked += 1;
                            tokio::time::sleep(*pause).await;
                        }
                        Err(e) => debug!("Click on {}[{}] failed: {}", selector, index, e),
                    }
                }
            }
        }
        StepAction::Hover { selector } => {
            if page.count(selector).await? > 0 {
                page.hover(selector, 0).await?;
            }
        }
        StepAction::PressKey(key) => page.press_key(*key).await?,
        StepAction::Search {
            selectors,
            query,
            type_pause,
            submit_pause,
        } => {
            for selector in selectors {
                if let Some(index) = first_visible(page, selector).await {
                    debug!("Searching '{}' via {}", query, selector);
                    page.fill(selector, index, query).await?;
                    tokio::time::sleep(*type_pause).await;
                    page.press_key(Key::Enter).await?;
                    tokio::time::sleep(*submit_pause).await;
                    page.fill(selector, index, "").await?;
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

async fn first_visible(page: &dyn PageDriver, selector: &str) -> Option<usize> {
    let count = page.count(selector).await.ok()?;
    for index in 0..count {
        if page.is_visible(selector, index).await.unwrap_or(false) {
            return Some(index);
        }
    }
    None
}

async fn scroll_sweep(page: &dyn PageDriver, step_pause: Duration) -> DriverResult<()> {
    let metrics = page.evaluate(PAGE_METRICS_SCRIPT).await?;
    let height = metrics.get(0).and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0) as u64;
    let viewport = metrics.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0).max(1.0) as u64;

    let steps = height.div_ceil(viewport).min(MAX_SWEEP_STEPS);
    for step in 1..=steps {
        page.evaluate(&format!("window.scrollTo(0, {})", step * viewport))
            .await?;
        tokio::time::sleep(step_pause).await;
    }
    page.evaluate("window.scrollTo(0, 0)").await?;
    Ok(())
}

/// Readiness detection with escalating activation.
#[derive(Debug, Clone)]
pub struct ContentPipeline {
    pub detector: ReadinessDetector,
    pub activator: ContentActivator,
    pub store: CaptureStore,
}

impl ContentPipeline {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            detector: ReadinessDetector::new(config.readiness.clone()),
            activator: ContentActivator::new(&config.pacing),
            store: CaptureStore::new(config.capture_dir.clone()),
        }
    }

    pub fn with_activator(mut self, activator: ContentActivator) -> Self {
        self.activator = activator;
        self
    }

    /// Wait for content, escalating through the activation tiers while the
    /// page stays empty. Always returns the most recent state.
    pub async fn ensure_content(&self, page: &dyn PageDriver) -> PageState {
        let readiness = self.detector.config();

        if !wait_for_selector(page, "body", readiness.body_timeout).await {
            debug!("No <body> after {}ms", readiness.body_timeout.as_millis());
        }

        let mut state = self.detector.detect(page, readiness.initial_wait).await;
        if state.has_content {
            return state;
        }

        if state.is_js_rendered {
            info!("JS-rendered page without content, triggering render");
            self.activator.run_tier(page, self.activator.js_tier()).await;
            state = self.detector.detect(page, readiness.secondary_wait).await;
            if state.has_content {
                return state;
            }
        }

        info!("Still no content, escalating to aggressive activation");
        self.activator
            .run_tier(page, self.activator.aggressive_tier())
            .await;
        state = self.detector.detect(page, readiness.final_wait).await;
        if state.has_content {
            return state;
        }

        warn!("Page has no content after all activation tiers");
        match page.screenshot(true).await {
            Ok(png) => match self.store.save_screenshot(&png, now_millis()).await {
                Ok(path) => info!("Saved debug screenshot to {}", path.display()),
                Err(e) => warn!("Could not save debug screenshot: {}", e),
            },
            Err(e) => warn!("Debug screenshot failed: {}", e),
        }
        state
    }
}

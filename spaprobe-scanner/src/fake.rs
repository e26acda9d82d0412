//! Scripted in-memory page used by the unit tests.

use crate::driver::{
    BrowserLauncher, Key, NavigationResponse, NetworkEvent, PageDriver, WaitUntil,
};
use crate::error::{DriverError, DriverResult};
use crate::readiness::{probe_script, DomSnapshot};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn snapshot_with(text: u64, elements: u64, html: u64) -> DomSnapshot {
    DomSnapshot {
        ready_state: "complete".to_string(),
        text_length: text,
        trimmed_text_length: text,
        html_length: html,
        element_count: elements,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub enum GotoOutcome {
    Status(u16),
    NoResponse,
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub visible: bool,
    /// URL the page moves to when this element is clicked.
    pub navigates_to: Option<String>,
}

#[derive(Default)]
struct FakeState {
    url: String,
    title: String,
    history: Vec<String>,
    goto_plan: VecDeque<GotoOutcome>,
    goto_default: Option<GotoOutcome>,
    goto_calls: Vec<(String, WaitUntil)>,
    snapshots: VecDeque<DomSnapshot>,
    probe_count: usize,
    fail_probes: bool,
    script_results: Vec<(String, serde_json::Value)>,
    scripts: Vec<String>,
    elements: HashMap<String, Vec<FakeElement>>,
    clicks: Vec<(String, usize)>,
    hovers: Vec<String>,
    fills: Vec<(String, String)>,
    keys: Vec<Key>,
    mouse_moves: usize,
    go_backs: usize,
    screenshots: usize,
    init_scripts: Vec<String>,
    extra_headers: BTreeMap<String, String>,
    sink: Option<mpsc::Sender<NetworkEvent>>,
    on_goto_events: Vec<NetworkEvent>,
    fail_subscribe: bool,
    closed: bool,
    close_count: usize,
}

/// Cheap handle; clones share state so a test keeps a view into the page a
/// launcher handed out.
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        let page = Self::default();
        page.with(|s| {
            s.url = "about:blank".to_string();
            s.goto_default = Some(GotoOutcome::Status(200));
        });
        page
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn plan_goto(&self, outcomes: impl IntoIterator<Item = GotoOutcome>) {
        self.with(|s| s.goto_plan.extend(outcomes));
    }

    pub fn default_goto(&self, outcome: GotoOutcome) {
        self.with(|s| s.goto_default = Some(outcome));
    }

    /// Queue probe results; the last one repeats forever.
    pub fn push_snapshot(&self, snapshot: DomSnapshot) {
        self.with(|s| s.snapshots.push_back(snapshot));
    }

    pub fn fail_probes(&self) {
        self.with(|s| s.fail_probes = true);
    }

    pub fn fail_subscribe(&self) {
        self.with(|s| s.fail_subscribe = true);
    }

    /// Any evaluated script containing `needle` returns `value`.
    pub fn script_result(&self, needle: &str, value: serde_json::Value) {
        self.with(|s| s.script_results.push((needle.to_string(), value)));
    }

    pub fn add_elements(&self, selector: &str, elements: Vec<FakeElement>) {
        self.with(|s| {
            s.elements
                .entry(selector.to_string())
                .or_default()
                .extend(elements)
        });
    }

    pub fn set_title(&self, title: &str) {
        self.with(|s| s.title = title.to_string());
    }

    /// Events delivered to the subscriber on every successful goto.
    pub fn emit_on_goto(&self, events: Vec<NetworkEvent>) {
        self.with(|s| s.on_goto_events = events);
    }

    pub fn goto_calls(&self) -> Vec<(String, WaitUntil)> {
        self.with(|s| s.goto_calls.clone())
    }

    pub fn probe_count(&self) -> usize {
        self.with(|s| s.probe_count)
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.with(|s| s.clicks.clone())
    }

    pub fn hovers(&self) -> Vec<String> {
        self.with(|s| s.hovers.clone())
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.with(|s| s.fills.clone())
    }

    pub fn keys(&self) -> Vec<Key> {
        self.with(|s| s.keys.clone())
    }

    pub fn scripts(&self) -> Vec<String> {
        self.with(|s| s.scripts.clone())
    }

    pub fn mouse_moves(&self) -> usize {
        self.with(|s| s.mouse_moves)
    }

    pub fn go_backs(&self) -> usize {
        self.with(|s| s.go_backs)
    }

    pub fn screenshots(&self) -> usize {
        self.with(|s| s.screenshots)
    }

    pub fn init_scripts(&self) -> Vec<String> {
        self.with(|s| s.init_scripts.clone())
    }

    pub fn extra_headers(&self) -> BTreeMap<String, String> {
        self.with(|s| s.extra_headers.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.with(|s| s.closed)
    }

    pub fn close_count(&self) -> usize {
        self.with(|s| s.close_count)
    }

    fn element(&self, selector: &str, index: usize) -> DriverResult<FakeElement> {
        self.with(|s| {
            s.elements
                .get(selector)
                .and_then(|els| els.get(index))
                .cloned()
                .ok_or_else(|| DriverError::ElementNotFound {
                    selector: selector.to_string(),
                    index,
                })
        })
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        _timeout: Duration,
    ) -> DriverResult<Option<NavigationResponse>> {
        self.ensure_open()?;
        let (outcome, sink, events) = self.with(|s| {
            s.goto_calls.push((url.to_string(), wait_until));
            let outcome = s
                .goto_plan
                .pop_front()
                .or_else(|| s.goto_default.clone())
                .unwrap_or(GotoOutcome::NoResponse);
            (outcome, s.sink.clone(), s.on_goto_events.clone())
        });

        let response = match outcome {
            GotoOutcome::Error(message) => return Err(DriverError::Navigation(message)),
            GotoOutcome::NoResponse => None,
            GotoOutcome::Status(status) => Some(NavigationResponse {
                url: url.to_string(),
                status,
                status_text: String::new(),
                headers: BTreeMap::new(),
            }),
        };

        self.with(|s| {
            let previous = std::mem::replace(&mut s.url, url.to_string());
            s.history.push(previous);
        });
        if let Some(sink) = sink {
            for event in events {
                let _ = sink.send(event).await;
            }
        }
        Ok(response)
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        self.ensure_open()?;
        if script == probe_script() {
            let snapshot = self.with(|s| {
                s.probe_count += 1;
                if s.fail_probes {
                    return None;
                }
                if s.snapshots.len() > 1 {
                    s.snapshots.pop_front()
                } else {
                    s.snapshots.front().cloned()
                }
            });
            let snapshot = snapshot
                .ok_or_else(|| DriverError::Evaluation("probe unavailable".to_string()))?;
            return serde_json::to_value(snapshot)
                .map_err(|e| DriverError::Evaluation(e.to_string()));
        }

        Ok(self.with(|s| {
            s.scripts.push(script.to_string());
            s.script_results
                .iter()
                .find(|(needle, _)| script.contains(needle.as_str()))
                .map(|(_, v)| v.clone())
                .unwrap_or(serde_json::Value::Null)
        }))
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        self.ensure_open()?;
        Ok(self.with(|s| s.elements.get(selector).map_or(0, Vec::len)))
    }

    async fn is_visible(&self, selector: &str, index: usize) -> DriverResult<bool> {
        Ok(self.element(selector, index)?.visible)
    }

    async fn click(&self, selector: &str, index: usize) -> DriverResult<()> {
        let element = self.element(selector, index)?;
        self.with(|s| {
            s.clicks.push((selector.to_string(), index));
            if let Some(target) = element.navigates_to {
                let previous = std::mem::replace(&mut s.url, target);
                s.history.push(previous);
            }
        });
        Ok(())
    }

    async fn hover(&self, selector: &str, index: usize) -> DriverResult<()> {
        self.element(selector, index)?;
        self.with(|s| s.hovers.push(selector.to_string()));
        Ok(())
    }

    async fn fill(&self, selector: &str, index: usize, value: &str) -> DriverResult<()> {
        self.element(selector, index)?;
        self.with(|s| s.fills.push((selector.to_string(), value.to_string())));
        Ok(())
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        _name: &str,
    ) -> DriverResult<Option<String>> {
        self.element(selector, index)?;
        Ok(None)
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> DriverResult<()> {
        self.with(|s| s.mouse_moves += 1);
        Ok(())
    }

    async fn press_key(&self, key: Key) -> DriverResult<()> {
        self.with(|s| s.keys.push(key));
        Ok(())
    }

    async fn url(&self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.with(|s| s.url.clone()))
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self.with(|s| s.title.clone()))
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.with(|s| {
            s.go_backs += 1;
            if let Some(previous) = s.history.pop() {
                s.url = previous;
            }
        });
        Ok(())
    }

    async fn screenshot(&self, _full_page: bool) -> DriverResult<Vec<u8>> {
        self.with(|s| s.screenshots += 1);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn add_init_script(&self, source: &str) -> DriverResult<()> {
        self.with(|s| s.init_scripts.push(source.to_string()));
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()> {
        self.with(|s| s.extra_headers = headers.clone());
        Ok(())
    }

    async fn subscribe(&self, sink: mpsc::Sender<NetworkEvent>) -> DriverResult<()> {
        self.with(|s| {
            if s.fail_subscribe {
                return Err(DriverError::Protocol("Network.enable failed".to_string()));
            }
            s.sink = Some(sink);
            Ok(())
        })
    }

    async fn close(&self) -> DriverResult<()> {
        self.with(|s| {
            s.closed = true;
            s.close_count += 1;
            s.sink = None;
        });
        Ok(())
    }
}

/// Hands out the same [`FakePage`] on every launch.
#[derive(Clone)]
pub struct FakeLauncher {
    pub page: FakePage,
    launches: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            launches: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakePage::new())
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        if self.fail {
            return Err(DriverError::Launch("no browser available".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.page.with(|s| s.closed = false);
        Ok(Box::new(self.page.clone()))
    }
}

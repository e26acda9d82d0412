//! Browser automation seam.
//!
//! The engine only ever talks to a page through [`PageDriver`]. Elements are
//! addressed as `(selector, index)` pairs into `querySelectorAll(selector)`,
//! which keeps the trait object-safe and lets tests script a fake page.

use crate::error::DriverResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Point at which a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    NetworkIdle,
    Commit,
}

/// Main-document response of a navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
}

/// A completed request/response pair as seen by the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkExchange {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    pub mime_type: String,
    /// Decoded body text, when the browser still had it.
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Response(NetworkExchange),
    Failed {
        url: String,
        method: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Escape,
    Enter,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Tab => "Tab",
            Key::Escape => "Escape",
            Key::Enter => "Enter",
        }
    }

    pub fn key_code(&self) -> i64 {
        match self {
            Key::Tab => 9,
            Key::Escape => 27,
            Key::Enter => 13,
        }
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for `wait_until`, bounded by `timeout`. Returns the
    /// main-document response when the browser reported one.
    async fn goto(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> DriverResult<Option<NavigationResponse>>;

    /// Evaluate an expression in the page and return its JSON value.
    /// `undefined` maps to `Value::Null`.
    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    async fn count(&self, selector: &str) -> DriverResult<usize>;

    async fn is_visible(&self, selector: &str, index: usize) -> DriverResult<bool>;

    async fn click(&self, selector: &str, index: usize) -> DriverResult<()>;

    async fn hover(&self, selector: &str, index: usize) -> DriverResult<()>;

    async fn fill(&self, selector: &str, index: usize, value: &str) -> DriverResult<()>;

    async fn attribute(&self, selector: &str, index: usize, name: &str)
    -> DriverResult<Option<String>>;

    async fn mouse_move(&self, x: f64, y: f64) -> DriverResult<()>;

    async fn press_key(&self, key: Key) -> DriverResult<()>;

    async fn url(&self) -> DriverResult<String>;

    async fn title(&self) -> DriverResult<String>;

    async fn go_back(&self) -> DriverResult<()>;

    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>>;

    /// Install a script that runs before any page script on every new document.
    async fn add_init_script(&self, source: &str) -> DriverResult<()>;

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()>;

    /// Forward every network event of this page into `sink` until the page closes.
    async fn subscribe(&self, sink: mpsc::Sender<NetworkEvent>) -> DriverResult<()>;

    /// Close the page and its browser. Drops any subscription sender.
    async fn close(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh browser context and open one blank page in it.
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>>;
}

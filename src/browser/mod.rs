//! Browser session abstraction.
//!
//! Every component that touches the site talks to a [`BrowserSession`]. The
//! binary drives Chromium over the DevTools protocol; tests drive a scripted
//! fake.

pub mod chromium;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub use chromium::ChromiumSession;

/// Opaque identifier of a browser window or tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub String);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an element resolved in a specific window.
///
/// Only valid until the window's document changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub window: WindowId,
    pub slot: u64,
}

/// Snapshot of the properties the viewer logic branches on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub displayed: bool,
    pub enabled: bool,
    #[serde(default)]
    pub class_name: String,
    /// Rendered width in CSS pixels.
    #[serde(default)]
    pub width: f64,
}

impl ElementState {
    pub fn is_interactable(&self) -> bool {
        self.displayed && self.enabled
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> anyhow::Result<()>;

    /// All elements matching `xpath`, in document order. With `within`, the
    /// expression is evaluated relative to that element.
    async fn find_elements(
        &mut self,
        xpath: &str,
        within: Option<&ElementRef>,
    ) -> anyhow::Result<Vec<ElementRef>>;

    async fn text(&mut self, element: &ElementRef) -> anyhow::Result<String>;

    async fn attribute(&mut self, element: &ElementRef, name: &str)
    -> anyhow::Result<Option<String>>;

    async fn state(&mut self, element: &ElementRef) -> anyhow::Result<ElementState>;

    /// A user-like click; fails when the element is not interactable.
    async fn click(&mut self, element: &ElementRef) -> anyhow::Result<()>;

    /// `element.click()` from page script, bypassing hit testing.
    async fn script_click(&mut self, element: &ElementRef) -> anyhow::Result<()>;

    /// Clear an input and type `value` into it.
    async fn fill(&mut self, element: &ElementRef, value: &str) -> anyhow::Result<()>;

    /// Press Enter with focus on `element`.
    async fn submit(&mut self, element: &ElementRef) -> anyhow::Result<()>;

    async fn window_ids(&mut self) -> anyhow::Result<Vec<WindowId>>;

    fn current_window(&self) -> WindowId;

    async fn switch_to_window(&mut self, window: &WindowId) -> anyhow::Result<()>;

    /// Open `url` in a fresh tab and wait for it to load. Does not switch to it.
    async fn open_tab(&mut self, url: &str) -> anyhow::Result<WindowId>;

    async fn close_window(&mut self, window: &WindowId) -> anyhow::Result<()>;

    /// Evaluate a script expression in the current window.
    async fn evaluate(&mut self, script: &str) -> anyhow::Result<serde_json::Value>;

    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

pub async fn find_first<S>(session: &mut S, xpath: &str) -> anyhow::Result<Option<ElementRef>>
where
    S: BrowserSession + ?Sized,
{
    Ok(session.find_elements(xpath, None).await?.into_iter().next())
}

/// Poll until an element matching `xpath` is displayed and enabled.
///
/// Returns `None` once `timeout` has elapsed; lookup errors while polling are
/// treated like a missing element.
pub async fn wait_for_element<S>(
    session: &mut S,
    xpath: &str,
    timeout: Duration,
    poll: Duration,
) -> Option<ElementRef>
where
    S: BrowserSession + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        match find_first(session, xpath).await {
            Ok(Some(element)) => match session.state(&element).await {
                Ok(state) if state.is_interactable() => return Some(element),
                Ok(_) => {}
                Err(err) => tracing::debug!(?err, xpath, "element state unavailable"),
            },
            Ok(None) => {}
            Err(err) => tracing::debug!(?err, xpath, "element lookup failed"),
        }

        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Wait until exactly one window exists that was not in `before` and return it.
pub async fn wait_for_new_window<S>(
    session: &mut S,
    before: &HashSet<WindowId>,
    timeout: Duration,
    poll: Duration,
) -> anyhow::Result<WindowId>
where
    S: BrowserSession + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        let mut opened = session
            .window_ids()
            .await?
            .into_iter()
            .filter(|id| !before.contains(id))
            .collect::<Vec<_>>();

        match opened.len() {
            0 => {}
            1 => return Ok(opened.remove(0)),
            n => anyhow::bail!("expected one new window, found {n}"),
        }

        if Instant::now() >= deadline {
            anyhow::bail!("no new window opened within {}ms", timeout.as_millis());
        }
        tokio::time::sleep(poll).await;
    }
}

/// Whitespace-separated class tokens, trimmed.
pub fn class_tokens(class_name: &str) -> impl Iterator<Item = &str> {
    class_name.split_whitespace()
}

//! Chromium session over the DevTools protocol using chromiumoxide.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use serde::Deserialize;

use super::{BrowserSession, ElementRef, ElementState, WindowId};
use crate::config::BrowserSettings;

const CHROME_PATH_ENV: &str = "IPLUS_CHROME_PATH";
const REGISTRY: &str = "window.__iplusBackupRefs";
/// Slot lookup into the registry; `undefined` once the node was pruned.
const REGISTRY_GET: &str = "(slot) => (window.__iplusBackupRefs && window.__iplusBackupRefs.nodes.get(slot))";

/// Locate a Chrome or Chromium executable.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured
        && path.exists()
    {
        return Some(path.clone());
    }

    if let Ok(p) = std::env::var(CHROME_PATH_ENV) {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

pub struct ChromiumSession {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
    windows: HashMap<WindowId, Page>,
    current: WindowId,
}

impl ChromiumSession {
    pub async fn launch(settings: &BrowserSettings) -> anyhow::Result<Self> {
        let chrome_path = find_chromium(settings.chrome_path.as_ref()).with_context(|| {
            format!("Chrome not found; install Chrome/Chromium or set {CHROME_PATH_ENV}")
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(settings.window_width, settings.window_height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--log-level=3")
            .arg("--start-maximized");
        if settings.headless {
            builder = builder.arg("--disable-gpu");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch Chrome")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::trace!(?err, "cdp handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("open initial tab")?;
        let current = window_id(&page);
        tracing::debug!(window = %current, "browser launched");

        let mut windows = HashMap::new();
        windows.insert(current.clone(), page);

        Ok(Self {
            browser,
            handler,
            windows,
            current,
        })
    }

    fn page(&self) -> anyhow::Result<&Page> {
        self.windows
            .get(&self.current)
            .ok_or_else(|| anyhow::anyhow!("current window is closed: {}", self.current))
    }

    async fn refresh_windows(&mut self) -> anyhow::Result<()> {
        let pages = self.browser.pages().await.context("list browser tabs")?;
        self.windows = pages
            .into_iter()
            .map(|page| (window_id(&page), page))
            .collect();
        Ok(())
    }

    async fn eval_in(&self, page: &Page, script: &str) -> anyhow::Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|err| anyhow::anyhow!("build evaluate params: {err}"))?;
        let result = page
            .evaluate_expression(params)
            .await
            .context("evaluate script")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Run `body` with `el` bound to the referenced element.
    async fn eval_on(&self, element: &ElementRef, body: &str) -> anyhow::Result<serde_json::Value> {
        if element.window != self.current {
            anyhow::bail!(
                "element belongs to window {} but current window is {}",
                element.window,
                self.current
            );
        }
        let script = format!(
            "(() => {{ const el = ({REGISTRY_GET})({slot}); \
             if (!el || !el.isConnected) throw new Error('stale element reference'); \
             {body} }})()",
            slot = element.slot,
        );
        self.eval_in(self.page()?, &script).await
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, text: Option<&str>) -> anyhow::Result<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13);
        if let Some(text) = text {
            builder = builder.text(text);
        }
        let params = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build key event: {err}"))?;
        self.page()?.execute(params).await.context("dispatch key event")?;
        Ok(())
    }

    async fn dispatch_mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> anyhow::Result<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|err| anyhow::anyhow!("build mouse event: {err}"))?;
        self.page()?.execute(params).await.context("dispatch mouse event")?;
        Ok(())
    }
}

fn window_id(page: &Page) -> WindowId {
    WindowId(page.target_id().as_ref().to_owned())
}

#[derive(Debug, Deserialize)]
struct ClickTarget {
    interactable: bool,
    x: f64,
    y: f64,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> anyhow::Result<()> {
        let page = self.page()?;
        page.goto(url)
            .await
            .with_context(|| format!("navigate to {url}"))?;
        Ok(())
    }

    async fn find_elements(
        &mut self,
        xpath: &str,
        within: Option<&ElementRef>,
    ) -> anyhow::Result<Vec<ElementRef>> {
        let scope = match within {
            Some(element) => {
                if element.window != self.current {
                    anyhow::bail!("scope element belongs to window {}", element.window);
                }
                format!("({REGISTRY_GET})({})", element.slot)
            }
            None => "document".to_owned(),
        };
        let xpath_literal = serde_json::to_string(xpath).context("encode xpath")?;
        let script = format!(
            "(() => {{ const reg = ({REGISTRY} = {REGISTRY} || \
             {{ next: 0, nodes: new Map(), slots: new WeakMap() }}); \
             const scope = {scope}; \
             if (!scope || !scope.isConnected) throw new Error('stale element reference'); \
             for (const [slot, node] of reg.nodes) {{ \
               if (!node.isConnected) {{ reg.nodes.delete(slot); reg.slots.delete(node); }} \
             }} \
             const snap = document.evaluate({xpath_literal}, scope, null, \
             XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             const out = []; \
             for (let i = 0; i < snap.snapshotLength; i++) {{ \
               const node = snap.snapshotItem(i); \
               let slot = reg.slots.get(node); \
               if (slot === undefined) {{ slot = reg.next++; reg.nodes.set(slot, node); reg.slots.set(node, slot); }} \
               out.push(slot); \
             }} \
             return out; }})()"
        );

        let value = self.eval_in(self.page()?, &script).await?;
        let slots: Vec<u64> = serde_json::from_value(value).context("decode element slots")?;
        Ok(slots
            .into_iter()
            .map(|slot| ElementRef {
                window: self.current.clone(),
                slot,
            })
            .collect())
    }

    async fn text(&mut self, element: &ElementRef) -> anyhow::Result<String> {
        let value = self
            .eval_on(element, "return el.innerText || el.textContent || '';")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        let name_literal = serde_json::to_string(name).context("encode attribute name")?;
        // Property first so `src` comes back as an absolute URL.
        let value = self
            .eval_on(
                element,
                &format!(
                    "const n = {name_literal}; \
                     const p = el[n]; \
                     if (typeof p === 'string') return p; \
                     return el.getAttribute(n);"
                ),
            )
            .await?;
        Ok(value.as_str().map(str::to_owned))
    }

    async fn state(&mut self, element: &ElementRef) -> anyhow::Result<ElementState> {
        let value = self
            .eval_on(
                element,
                "const style = window.getComputedStyle(el); \
                 const rect = el.getBoundingClientRect(); \
                 const cls = typeof el.className === 'string' ? el.className : (el.getAttribute('class') || ''); \
                 return { \
                   displayed: style.display !== 'none' && style.visibility !== 'hidden' \
                     && (rect.width > 0 || rect.height > 0), \
                   enabled: !el.disabled, \
                   class_name: cls, \
                   width: typeof el.width === 'number' ? el.width : rect.width \
                 };",
            )
            .await?;
        serde_json::from_value(value).context("decode element state")
    }

    async fn click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        let value = self
            .eval_on(
                element,
                "el.scrollIntoView({ block: 'center', inline: 'center' }); \
                 const style = window.getComputedStyle(el); \
                 const rect = el.getBoundingClientRect(); \
                 return { \
                   interactable: !el.disabled && style.display !== 'none' \
                     && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0, \
                   x: rect.left + rect.width / 2, \
                   y: rect.top + rect.height / 2 \
                 };",
            )
            .await?;
        let target: ClickTarget = serde_json::from_value(value).context("decode click target")?;
        if !target.interactable {
            anyhow::bail!("element is not interactable");
        }

        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, target.x, target.y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, target.x, target.y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, target.x, target.y)
            .await?;
        Ok(())
    }

    async fn script_click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        self.eval_on(element, "el.click(); return null;").await?;
        Ok(())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> anyhow::Result<()> {
        // Native setter so framework-controlled inputs notice the reset.
        self.eval_on(
            element,
            "el.focus(); \
             const proto = Object.getPrototypeOf(el); \
             const desc = Object.getOwnPropertyDescriptor(proto, 'value'); \
             if (desc && desc.set) { desc.set.call(el, ''); } else { el.value = ''; } \
             el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true })); \
             return null;",
        )
        .await
        .context("clear input")?;

        self.page()?
            .execute(InsertTextParams::new(value))
            .await
            .context("type into input")?;
        Ok(())
    }

    async fn submit(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        self.eval_on(element, "el.focus(); return null;").await?;
        self.dispatch_key(DispatchKeyEventType::KeyDown, None).await?;
        self.dispatch_key(DispatchKeyEventType::Char, Some("\r")).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, None).await?;
        Ok(())
    }

    async fn window_ids(&mut self) -> anyhow::Result<Vec<WindowId>> {
        self.refresh_windows().await?;
        let mut ids = self.windows.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    fn current_window(&self) -> WindowId {
        self.current.clone()
    }

    async fn switch_to_window(&mut self, window: &WindowId) -> anyhow::Result<()> {
        if !self.windows.contains_key(window) {
            self.refresh_windows().await?;
        }
        let page = self
            .windows
            .get(window)
            .ok_or_else(|| anyhow::anyhow!("no such window: {window}"))?;
        page.bring_to_front().await.context("bring tab to front")?;
        self.current = window.clone();
        tracing::debug!(window = %window, "switched window");
        Ok(())
    }

    async fn open_tab(&mut self, url: &str) -> anyhow::Result<WindowId> {
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("open tab: {url}"))?;
        if let Err(err) = page.wait_for_navigation().await {
            tracing::debug!(?err, url, "image tab did not report load");
        }
        let id = window_id(&page);
        self.windows.insert(id.clone(), page);
        Ok(id)
    }

    async fn close_window(&mut self, window: &WindowId) -> anyhow::Result<()> {
        let page = self
            .windows
            .remove(window)
            .ok_or_else(|| anyhow::anyhow!("no such window: {window}"))?;
        page.close()
            .await
            .with_context(|| format!("close window: {window}"))?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<serde_json::Value> {
        self.eval_in(self.page()?, script).await
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.windows.clear();
        self.browser.close().await.context("close browser")?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

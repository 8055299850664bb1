use std::path::PathBuf;

use anyhow::Context as _;
use base64::Engine as _;

use crate::browser::{self, BrowserSession, WindowId};
use crate::config::Config;
use crate::formats::PageCapture;
use crate::image_store;

/// Draws the tab's image onto a canvas at natural size and returns it as a PNG
/// data URL, or `null` when there is nothing to draw.
pub const CANVAS_SNAPSHOT_SCRIPT: &str = r#"(() => {
  try {
    const img = document.querySelector('img');
    if (!img) return null;
    const canvas = document.createElement('canvas');
    canvas.width = img.naturalWidth || img.width;
    canvas.height = img.naturalHeight || img.height;
    const ctx = canvas.getContext('2d');
    ctx.drawImage(img, 0, 0, canvas.width, canvas.height);
    return canvas.toDataURL('image/png');
  } catch (e) {
    return null;
  }
})()"#;

/// Class fragments that mark the forward arrow as unusable.
const DISABLED_MARKERS: &[&str] = &["disabled", "inactive", "hidden", "nodisplay"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved(PathBuf),
    /// An empty side of a spread; not a page.
    Blank,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadSide {
    Left,
    Right,
}

impl SpreadSide {
    fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

pub struct PageCapturer<'a> {
    config: &'a Config,
}

impl<'a> PageCapturer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Capture the single page shown in the viewer.
    pub async fn capture_single<S>(&self, session: &mut S, page_number: u32) -> CaptureOutcome
    where
        S: BrowserSession + ?Sized,
    {
        let result = async {
            let image = browser::find_first(session, &self.config.selectors.main_image)
                .await?
                .ok_or_else(|| anyhow::anyhow!("viewer image not found"))?;
            let src = image_source(session, &image).await?;
            self.capture_source(session, &src, page_number).await
        }
        .await;

        finish(result, page_number)
    }

    /// Capture one side of a two-page spread.
    pub async fn capture_side<S>(
        &self,
        session: &mut S,
        side: SpreadSide,
        page_number: u32,
    ) -> CaptureOutcome
    where
        S: BrowserSession + ?Sized,
    {
        let result = async {
            let images = session
                .find_elements(&self.config.selectors.main_image_double_page, None)
                .await?;
            let Some(image) = images.get(side.index()) else {
                tracing::debug!(side = side.as_str(), "spread side missing");
                return Ok(None);
            };

            let state = session.state(image).await.context("read spread image state")?;
            if state.width < self.config.capture.blank_width_threshold {
                tracing::info!(side = side.as_str(), width = state.width, "blank spread side");
                return Ok(None);
            }

            let src = image_source(session, image).await?;
            self.capture_source(session, &src, page_number).await.map(Some)
        }
        .await;

        match result {
            Ok(None) => CaptureOutcome::Blank,
            Ok(Some(path)) => finish(Ok(path), page_number),
            Err(err) => finish(Err(err), page_number),
        }
    }

    /// Open `src` in its own tab, snapshot it, and come back to the viewer.
    async fn capture_source<S>(
        &self,
        session: &mut S,
        src: &str,
        page_number: u32,
    ) -> anyhow::Result<PathBuf>
    where
        S: BrowserSession + ?Sized,
    {
        let viewer = session.current_window();
        let tab = session.open_tab(src).await.context("open page image tab")?;

        let result = self.snapshot_tab(session, &tab, page_number).await;

        if let Err(err) = session.close_window(&tab).await {
            tracing::warn!(window = %tab, "could not close image tab: {err:#}");
        }
        session
            .switch_to_window(&viewer)
            .await
            .context("return to viewer window")?;

        result
    }

    async fn snapshot_tab<S>(
        &self,
        session: &mut S,
        tab: &WindowId,
        page_number: u32,
    ) -> anyhow::Result<PathBuf>
    where
        S: BrowserSession + ?Sized,
    {
        let timeouts = &self.config.timeouts;

        session.switch_to_window(tab).await.context("switch to image tab")?;
        tokio::time::sleep(timeouts.post_click()).await;

        // Clicking the bare image forces it to finish rendering before the snapshot.
        let image = browser::find_first(session, &self.config.selectors.tab_image)
            .await?
            .ok_or_else(|| anyhow::anyhow!("image not found in tab"))?;
        session.click(&image).await.context("click tab image")?;
        tokio::time::sleep(timeouts.image_settle()).await;

        let data_url = session
            .evaluate(CANVAS_SNAPSHOT_SCRIPT)
            .await
            .context("run canvas snapshot")?;
        let data_url = data_url
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("canvas snapshot returned no data"))?;
        let image_bytes = decode_data_url(data_url)?;

        image_store::write_page(
            &self.config.output.work_dir,
            &PageCapture {
                page_number,
                image_bytes,
            },
        )
    }

    /// Click the forward arrow if it is usable. `false` means the book is exhausted.
    pub async fn advance<S>(&self, session: &mut S) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        let xpath = &self.config.selectors.next_arrow;
        let result = async {
            let Some(arrow) = browser::find_first(session, xpath).await? else {
                tracing::info!("next arrow not found; reached last page");
                return Ok(false);
            };

            let state = session.state(&arrow).await?;
            if is_disabled_class(&state.class_name) {
                tracing::info!("next arrow is disabled; reached last page");
                return Ok(false);
            }
            if !state.is_interactable() {
                tracing::info!("next arrow not visible or enabled; reached last page");
                return Ok(false);
            }

            session.script_click(&arrow).await.context("click next arrow")?;
            tokio::time::sleep(self.config.timeouts.advance_settle()).await;

            if browser::find_first(session, xpath).await?.is_none() {
                tracing::warn!("next arrow disappeared after advancing; stopping");
                return Ok(false);
            }
            anyhow::Ok(true)
        }
        .await;

        result.unwrap_or_else(|err| {
            tracing::warn!("navigation error: {err:#}");
            false
        })
    }
}

fn finish(result: anyhow::Result<PathBuf>, page_number: u32) -> CaptureOutcome {
    match result {
        Ok(path) => {
            tracing::info!(page = page_number, path = %path.display(), "page saved");
            CaptureOutcome::Saved(path)
        }
        Err(err) => {
            tracing::warn!(page = page_number, "page capture failed: {err:#}");
            CaptureOutcome::Failed
        }
    }
}

async fn image_source<S>(session: &mut S, image: &browser::ElementRef) -> anyhow::Result<String>
where
    S: BrowserSession + ?Sized,
{
    let src = session
        .attribute(image, "src")
        .await
        .context("read image src")?
        .unwrap_or_default();
    if src.trim().is_empty() {
        anyhow::bail!("no image source found");
    }
    Ok(src)
}

pub fn is_disabled_class(class_name: &str) -> bool {
    let lower = class_name.to_ascii_lowercase();
    DISABLED_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Bytes carried by a base64 `data:` URL.
pub fn decode_data_url(data_url: &str) -> anyhow::Result<Vec<u8>> {
    let (_, payload) = data_url
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("malformed data url"))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("decode base64 image payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_markers_match_case_insensitively() {
        assert!(is_disabled_class("arrowRight arrowRight--Disabled"));
        assert!(is_disabled_class("arrow noDisplay"));
        assert!(is_disabled_class("arrow isInactive"));
        assert!(!is_disabled_class("iplus-l-ReactPreviewFrame__paginationArrow__arrowRight"));
        assert!(!is_disabled_class(""));
    }

    #[test]
    fn data_url_payload_is_decoded() -> anyhow::Result<()> {
        assert_eq!(decode_data_url("data:image/png;base64,AAEC")?, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn data_url_without_comma_is_rejected() {
        assert!(decode_data_url("data:image/png;base64").is_err());
    }

    #[test]
    fn data_url_with_bad_base64_is_rejected() {
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }
}

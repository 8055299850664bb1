//! Drives the book viewer from the catalog to the last page.
//!
//! The navigator moves through `Closed → VolumeChosen → ViewerOpen →
//! LayoutSet → PageReady → Exhausted`. Declining every volume ends in
//! `Cancelled` instead. Each step checks it is called from the state it
//! expects, so a failed setup step cannot be followed by a capture.

use std::collections::HashSet;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::browser::{self, BrowserSession, ElementRef};
use crate::capture::{CaptureOutcome, PageCapturer, SpreadSide};
use crate::config::Config;
use crate::formats::{CatalogEntry, PageLayout, ProcessingStats, VolumeSelection};
use crate::prompt::{self, Console};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Closed,
    VolumeChosen,
    ViewerOpen,
    LayoutSet,
    PageReady,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected(VolumeSelection),
    /// Every volume was declined.
    Cancelled,
}

pub struct Navigator<'a> {
    config: &'a Config,
    state: ViewerState,
}

impl<'a> Navigator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            state: ViewerState::Closed,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    fn require_state(&self, expected: ViewerState) -> anyhow::Result<()> {
        if self.state != expected {
            anyhow::bail!(
                "viewer is in state {:?}, expected {:?}",
                self.state,
                expected
            );
        }
        Ok(())
    }

    fn move_to(&mut self, next: ViewerState) {
        tracing::debug!(from = ?self.state, to = ?next, "viewer transition");
        self.state = next;
    }

    /// Open the title's window and settle which volume to back up.
    pub async fn select_title<S>(
        &mut self,
        session: &mut S,
        entry: &CatalogEntry,
        console: &mut dyn Console,
    ) -> anyhow::Result<SelectionOutcome>
    where
        S: BrowserSession + ?Sized,
    {
        self.require_state(ViewerState::Closed)?;
        let timeouts = &self.config.timeouts;

        let before = session
            .window_ids()
            .await
            .context("list windows")?
            .into_iter()
            .collect::<HashSet<_>>();
        session
            .click(&entry.handle)
            .await
            .with_context(|| format!("click book: {}", entry.title))?;

        let book_window =
            browser::wait_for_new_window(session, &before, timeouts.page_load(), timeouts.poll())
                .await
                .context("wait for book window")?;
        session
            .switch_to_window(&book_window)
            .await
            .context("switch to book window")?;
        tokio::time::sleep(timeouts.navigation()).await;

        self.dismiss_commercial_popup(session).await;

        match self.choose_volume(session, console).await? {
            Some(selection) => {
                self.move_to(ViewerState::VolumeChosen);
                Ok(SelectionOutcome::Selected(selection))
            }
            None => {
                self.move_to(ViewerState::Cancelled);
                Ok(SelectionOutcome::Cancelled)
            }
        }
    }

    async fn dismiss_commercial_popup<S>(&self, session: &mut S)
    where
        S: BrowserSession + ?Sized,
    {
        match browser::find_first(session, &self.config.selectors.popup_close).await {
            Ok(Some(close)) => match session.click(&close).await {
                Ok(()) => tracing::info!("commercial popup closed"),
                Err(err) => tracing::warn!("could not close commercial popup: {err:#}"),
            },
            Ok(None) => {}
            Err(err) => tracing::debug!(?err, "commercial popup lookup failed"),
        }
    }

    /// `None` when the user declines every volume.
    async fn choose_volume<S>(
        &self,
        session: &mut S,
        console: &mut dyn Console,
    ) -> anyhow::Result<Option<VolumeSelection>>
    where
        S: BrowserSession + ?Sized,
    {
        let volumes = session
            .find_elements(&self.config.selectors.nav_volumes, None)
            .await
            .context("list volumes")?;
        if volumes.is_empty() {
            return Ok(Some(VolumeSelection::Single));
        }

        console.say("\nMultiple volumes detected. Please select:")?;
        for volume in &volumes {
            let title = match self.volume_title(session, volume).await {
                Ok(title) => title,
                Err(err) => {
                    tracing::warn!("error reading volume: {err:#}");
                    continue;
                }
            };

            if !prompt::confirm_strict(console, &format!("Save volume '{title}'?"))? {
                console.say("Volume skipped.")?;
                continue;
            }

            match session.click(volume).await {
                Ok(()) => {
                    tracing::info!(volume = %title, "selected volume");
                    return Ok(Some(VolumeSelection::Volume(title)));
                }
                Err(err) => tracing::warn!(volume = %title, "could not select volume: {err:#}"),
            }
        }

        console.say("No volumes selected.")?;
        Ok(None)
    }

    async fn volume_title<S>(&self, session: &mut S, volume: &ElementRef) -> anyhow::Result<String>
    where
        S: BrowserSession + ?Sized,
    {
        let heading = session
            .find_elements(&self.config.selectors.volume_title, Some(volume))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("volume has no title"))?;
        Ok(session.text(&heading).await?.trim().to_owned())
    }

    /// Open the viewer and jump to the cover page.
    pub async fn open_viewer<S>(&mut self, session: &mut S) -> anyhow::Result<()>
    where
        S: BrowserSession + ?Sized,
    {
        self.require_state(ViewerState::VolumeChosen)?;
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        tokio::time::sleep(timeouts.post_click()).await;

        let open_book = browser::wait_for_element(
            session,
            &selectors.open_book,
            timeouts.page_load(),
            timeouts.poll(),
        )
        .await
        .ok_or_else(|| anyhow::anyhow!("open-book control not found"))?;
        session.click(&open_book).await.context("click open book")?;
        tokio::time::sleep(timeouts.navigation()).await;

        let page_input = browser::wait_for_element(
            session,
            &selectors.page_input,
            timeouts.page_load(),
            timeouts.poll(),
        )
        .await
        .ok_or_else(|| anyhow::anyhow!("page number input not found"))?;
        session
            .fill(&page_input, &self.config.site.cover_page)
            .await
            .context("enter cover page")?;
        session
            .submit(&page_input)
            .await
            .context("submit cover page")?;
        tokio::time::sleep(timeouts.navigation()).await;

        tracing::info!("book viewer opened");
        self.move_to(ViewerState::ViewerOpen);
        Ok(())
    }

    /// Switch the viewer to `layout` unless the toolbar says it is already active.
    pub async fn set_layout<S>(&mut self, session: &mut S, layout: PageLayout) -> anyhow::Result<()>
    where
        S: BrowserSession + ?Sized,
    {
        self.require_state(ViewerState::ViewerOpen)?;
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        let toolbar = browser::find_first(session, &selectors.tool_bar)
            .await?
            .ok_or_else(|| anyhow::anyhow!("viewer toolbar not found"))?;
        let toolbar_state = session.state(&toolbar).await.context("read toolbar")?;

        let (marker, target_link) = match layout {
            PageLayout::Double => ("currentDoublePage", &selectors.double_page_link),
            PageLayout::Single => ("currentOnePage", &selectors.one_page_link),
        };

        if browser::class_tokens(&toolbar_state.class_name).any(|token| token == marker) {
            tracing::debug!(layout = layout.as_str(), "layout already active");
            self.move_to(ViewerState::LayoutSet);
            return Ok(());
        }

        let menu = browser::wait_for_element(
            session,
            &selectors.view_mode_link,
            timeouts.page_load(),
            timeouts.poll(),
        )
        .await
        .ok_or_else(|| anyhow::anyhow!("view mode menu not found"))?;
        session.click(&menu).await.context("open view mode menu")?;
        tokio::time::sleep(timeouts.menu()).await;

        let link =
            browser::wait_for_element(session, target_link, timeouts.page_load(), timeouts.poll())
                .await
                .ok_or_else(|| anyhow::anyhow!("{} page option not found", layout.as_str()))?;
        session
            .script_click(&link)
            .await
            .context("choose page layout")?;
        tokio::time::sleep(timeouts.navigation()).await;

        tracing::info!(layout = layout.as_str(), "page layout set");
        self.move_to(ViewerState::LayoutSet);
        Ok(())
    }

    /// Capture pages until the forward arrow gives out or `cancel` fires.
    ///
    /// A failed capture is counted and its page number is left unused; the
    /// walk continues with the next page.
    pub async fn traverse<S>(
        &mut self,
        session: &mut S,
        layout: PageLayout,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ProcessingStats>
    where
        S: BrowserSession + ?Sized,
    {
        self.require_state(ViewerState::LayoutSet)?;
        self.move_to(ViewerState::PageReady);

        let capturer = PageCapturer::new(self.config);
        let mut stats = ProcessingStats::start();
        let mut next_page = self.config.capture.start_page;

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(next_page, "interrupted; stopping before next page");
                stats.interrupted = true;
                break;
            }

            match layout {
                PageLayout::Single => {
                    let outcome = capturer.capture_single(session, next_page).await;
                    tally(outcome, &mut stats, &mut next_page);
                }
                PageLayout::Double => {
                    for side in [SpreadSide::Left, SpreadSide::Right] {
                        let outcome = capturer.capture_side(session, side, next_page).await;
                        tally(outcome, &mut stats, &mut next_page);
                    }
                }
            }

            tokio::time::sleep(self.config.timeouts.post_click()).await;

            if cancel.is_cancelled() {
                stats.interrupted = true;
                break;
            }
            if !capturer.advance(session).await {
                tracing::info!("reached end of book");
                self.move_to(ViewerState::Exhausted);
                break;
            }
            tracing::debug!(next_page, "advanced to next page");
        }

        stats.finish();
        tracing::info!(
            pages = stats.pages_processed,
            errors = stats.errors_encountered,
            seconds = stats.duration().as_secs_f64(),
            interrupted = stats.interrupted,
            "processing complete"
        );
        Ok(stats)
    }
}

/// Saved and failed captures each use up a page number; blank sides do not.
fn tally(outcome: CaptureOutcome, stats: &mut ProcessingStats, next_page: &mut u32) {
    match outcome {
        CaptureOutcome::Saved(_) => {
            stats.pages_processed += 1;
            *next_page += 1;
        }
        CaptureOutcome::Failed => {
            stats.errors_encountered += 1;
            *next_page += 1;
        }
        CaptureOutcome::Blank => {}
    }
}

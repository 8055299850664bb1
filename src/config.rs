use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://www.iplusinteractif.com/";

/// Everything a run needs, built once and passed by reference to each component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteSettings,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    pub capture: CaptureSettings,
    pub output: OutputSettings,
    pub browser: BrowserSettings,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Config {
    /// Built-in defaults overlaid with a partial YAML document.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).context("deserialize config yaml")?;
        url::Url::parse(&config.site.base_url)
            .with_context(|| format!("site.base_url is not a url: {}", config.site.base_url))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
    /// Typed into the viewer's page input to jump back to the first page.
    pub cover_page: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            cover_page: "C1".to_owned(),
        }
    }
}

/// XPath selectors for the viewer UI, except `cookies_reject` which is an element id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login_email: String,
    pub login_password: String,
    pub login_button: String,
    pub cookies_reject: String,
    pub book_containers: String,
    pub book_title: String,
    pub popup_close: String,
    pub nav_volumes: String,
    pub volume_title: String,
    pub open_book: String,
    pub page_input: String,
    pub main_image: String,
    pub main_image_double_page: String,
    pub next_arrow: String,
    pub view_mode_link: String,
    pub double_page_link: String,
    pub one_page_link: String,
    pub tool_bar: String,
    /// The image shown in a tab opened on a bare image URL.
    pub tab_image: String,
}

impl Selectors {
    pub fn cookies_reject_xpath(&self) -> String {
        format!("//*[@id='{}']", self.cookies_reject)
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            login_email: "//*[@id='loginId']".to_owned(),
            login_password: "//*[@id='password']".to_owned(),
            login_button: "//*[contains(@class, 'blue button')]".to_owned(),
            cookies_reject: "onetrust-reject-all-handler".to_owned(),
            book_containers: "//div[contains(@class, 'accessContainer')]".to_owned(),
            book_title: ".//h2[@class='access__title']".to_owned(),
            popup_close: "//*[@id=\"commercialpopup\"]/div/div/div[1]/button".to_owned(),
            nav_volumes: "//*[@id=\"iplus-R-confBook\"]/div[1]/div/ul/li".to_owned(),
            volume_title: ".//h3".to_owned(),
            open_book: "//a[@class='iplus-l-confBook__itemVolumeCouv coverEffect']".to_owned(),
            page_input: "//input[@class='iplus-R-ReactPreviewFrame__pagination_input']".to_owned(),
            main_image: "//*[@id=\"iplus-R-ReactPreviewFrame\"]/div/div[3]/div/div/div[1]/img"
                .to_owned(),
            main_image_double_page:
                "//div[contains(@class, 'iplus-R-ReactPreviewFrame__containerDoublePage')]//img"
                    .to_owned(),
            next_arrow:
                "//div[contains(@class, 'iplus-l-ReactPreviewFrame__paginationArrow__arrowRight')]"
                    .to_owned(),
            view_mode_link: "//div[@class='iplus-R-ReactNavToolbar']/div[10]/div/a".to_owned(),
            double_page_link:
                "//a[contains(@class,'iplus-R-ReactPreviewFrame__toolsPageTemplatePageDouble')]"
                    .to_owned(),
            one_page_link:
                "//a[contains(@class,'iplus-R-ReactPreviewFrame__toolsPageTemplatePageSingle')]"
                    .to_owned(),
            tool_bar: "//nav[contains(@class, 'iplus-R-ReactPreviewFrame__toolsPageItems')]"
                .to_owned(),
            tab_image: "//img".to_owned(),
        }
    }
}

/// Wait budgets and settle delays, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Upper bound when waiting for a required element to become interactable.
    pub page_load_ms: u64,
    /// Settle after a navigation inside the site.
    pub navigation_ms: u64,
    /// Settle after a click that triggers rendering.
    pub post_click_ms: u64,
    /// Settle after opening the layout menu.
    pub menu_ms: u64,
    /// Settle between clicking the page image and snapshotting it.
    pub image_settle_ms: u64,
    /// Settle after clicking the forward arrow.
    pub advance_settle_ms: u64,
    /// Polling interval for condition-based waits.
    pub poll_ms: u64,
}

impl Timeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn post_click(&self) -> Duration {
        Duration::from_millis(self.post_click_ms)
    }

    pub fn menu(&self) -> Duration {
        Duration::from_millis(self.menu_ms)
    }

    pub fn image_settle(&self) -> Duration {
        Duration::from_millis(self.image_settle_ms)
    }

    pub fn advance_settle(&self) -> Duration {
        Duration::from_millis(self.advance_settle_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    /// All waits collapsed to zero; used by tests that drive a scripted session.
    pub fn immediate() -> Self {
        Self {
            page_load_ms: 0,
            navigation_ms: 0,
            post_click_ms: 0,
            menu_ms: 0,
            image_settle_ms: 0,
            advance_settle_ms: 0,
            poll_ms: 1,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_ms: 10_000,
            navigation_ms: 4_000,
            post_click_ms: 4_000,
            menu_ms: 2_000,
            image_settle_ms: 300,
            advance_settle_ms: 500,
            poll_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Number given to the first captured page.
    pub start_page: u32,
    /// A spread side narrower than this (CSS pixels) is treated as blank.
    pub blank_width_threshold: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            start_page: 0,
            blank_width_threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub work_dir: PathBuf,
    pub save_dir: PathBuf,
    /// Where the final PDF and preserved image directories are written.
    pub output_dir: PathBuf,
    pub default_book_name: String,
    pub page_size: PageSize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("imgs"),
            save_dir: PathBuf::from("save"),
            output_dir: PathBuf::from("."),
            default_book_name: "book".to_owned(),
            page_size: PageSize::default(),
        }
    }
}

/// PDF page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    const POINTS_PER_MM: f64 = 72.0 / 25.4;

    pub fn width_pt(&self) -> f64 {
        self.width_mm * Self::POINTS_PER_MM
    }

    pub fn height_pt(&self) -> f64 {
        self.height_mm * Self::POINTS_PER_MM
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width_mm: 2640.0,
            height_mm: 3263.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

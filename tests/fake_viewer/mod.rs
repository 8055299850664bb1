#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine as _;
use iplus_backup::browser::{BrowserSession, ElementRef, ElementState, WindowId};
use iplus_backup::config::Selectors;
use tokio_util::sync::CancellationToken;

/// One side of a viewer page: the image URL and its rendered width.
#[derive(Debug, Clone)]
pub struct FakeSide {
    pub src: String,
    pub width: f64,
}

impl FakeSide {
    pub fn page(src: &str) -> Self {
        Self {
            src: src.to_owned(),
            width: 600.0,
        }
    }

    pub fn blank() -> Self {
        Self {
            src: String::new(),
            width: 0.0,
        }
    }
}

/// How the forward arrow looks once the last view is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowEnd {
    DisabledClass,
    /// No arrow on the last view; reaching it by a click looks like the arrow vanished.
    Absent,
    Hidden,
    NotEnabled,
}

#[derive(Debug, Clone)]
pub struct FakeBook {
    /// `None` models a catalog card without a readable title.
    pub title: Option<String>,
    pub volumes: Vec<String>,
    /// What the viewer shows at each position of the forward arrow.
    pub views: Vec<Vec<FakeSide>>,
    pub starts_in_double_page: bool,
    pub arrow_end: ArrowEnd,
}

impl FakeBook {
    pub fn single_pages(title: &str, srcs: &[&str]) -> Self {
        Self {
            title: Some(title.to_owned()),
            volumes: Vec::new(),
            views: srcs.iter().map(|src| vec![FakeSide::page(src)]).collect(),
            starts_in_double_page: false,
            arrow_end: ArrowEnd::DisabledClass,
        }
    }

    pub fn spreads(title: &str, views: Vec<Vec<FakeSide>>) -> Self {
        Self {
            title: Some(title.to_owned()),
            volumes: Vec::new(),
            views,
            starts_in_double_page: false,
            arrow_end: ArrowEnd::DisabledClass,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeSite {
    pub login_form: bool,
    pub cookie_banner: bool,
    pub commercial_popup: bool,
    pub books: Vec<FakeBook>,
    /// PNG bytes served for each image URL. URLs not listed fail to snapshot.
    pub images: HashMap<String, Vec<u8>>,
}

impl FakeSite {
    pub fn with_books(books: Vec<FakeBook>) -> Self {
        let mut images = HashMap::new();
        for (n, src) in books
            .iter()
            .flat_map(|book| book.views.iter().flatten())
            .filter(|side| !side.src.is_empty())
            .map(|side| side.src.clone())
            .enumerate()
        {
            images.insert(src, solid_png(40 + n as u32, 60, n as u8));
        }
        Self {
            login_form: true,
            cookie_banner: true,
            commercial_popup: true,
            books,
            images,
        }
    }
}

pub fn solid_png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, 120, 200]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

#[derive(Debug, Clone)]
enum Window {
    Account,
    Book(usize),
    Image { src: String, clicked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Email,
    Password,
    LoginButton,
    CookieReject,
    BookContainer(usize),
    BookTitle(usize),
    PopupClose,
    Volume(usize),
    VolumeTitle(usize),
    OpenBook,
    PageInput,
    ViewImage { view: usize, side: usize },
    NextArrow,
    ViewModeLink,
    DoublePageLink,
    OnePageLink,
    Toolbar,
    TabImage,
}

/// A scripted [`BrowserSession`] that models the login page, the catalog, the
/// volume picker, the viewer and the image tabs.
pub struct FakeViewer {
    site: FakeSite,
    selectors: Selectors,
    windows: BTreeMap<WindowId, Window>,
    current: WindowId,
    next_window: u32,
    elements: HashMap<u64, (WindowId, Element)>,
    next_slot: u64,

    email: String,
    password: String,
    logged_in: bool,
    cookie_banner: bool,
    commercial_popup: bool,
    viewer_open: bool,
    page_input: String,
    on_cover: bool,
    view: usize,
    double_page: bool,
    menu_open: bool,

    snapshots: usize,
    interrupt: Option<(usize, CancellationToken)>,

    pub chosen_volume: Option<String>,
    pub shut_down: bool,
}

impl FakeViewer {
    pub fn new(site: FakeSite, selectors: Selectors) -> Self {
        let main = WindowId("main".to_owned());
        let mut windows = BTreeMap::new();
        windows.insert(main.clone(), Window::Account);
        let cookie_banner = site.cookie_banner;
        let commercial_popup = site.commercial_popup;
        Self {
            site,
            selectors,
            windows,
            current: main,
            next_window: 1,
            elements: HashMap::new(),
            next_slot: 0,
            email: String::new(),
            password: String::new(),
            logged_in: false,
            cookie_banner,
            commercial_popup,
            viewer_open: false,
            page_input: String::new(),
            on_cover: false,
            view: 0,
            double_page: false,
            menu_open: false,
            snapshots: 0,
            interrupt: None,
            chosen_volume: None,
            shut_down: false,
        }
    }

    /// Cancel `token` right after the `count`-th successful snapshot.
    pub fn interrupt_after(mut self, count: usize, token: CancellationToken) -> Self {
        self.interrupt = Some((count, token));
        self
    }

    pub fn cookie_banner_showing(&self) -> bool {
        self.cookie_banner
    }

    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    fn open_window(&mut self, window: Window) -> WindowId {
        let id = WindowId(format!("window-{}", self.next_window));
        self.next_window += 1;
        self.windows.insert(id.clone(), window);
        id
    }

    fn register(&mut self, element: Element) -> ElementRef {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.elements.insert(slot, (self.current.clone(), element));
        ElementRef {
            window: self.current.clone(),
            slot,
        }
    }

    fn resolve(&self, element: &ElementRef) -> anyhow::Result<Element> {
        let Some((window, resolved)) = self.elements.get(&element.slot) else {
            anyhow::bail!("unknown element {}", element.slot);
        };
        if *window != self.current || element.window != self.current {
            anyhow::bail!("element belongs to window {window}, not {}", self.current);
        }
        Ok(*resolved)
    }

    fn book(&self) -> anyhow::Result<&FakeBook> {
        match self.windows.get(&self.current) {
            Some(Window::Book(index)) => Ok(&self.site.books[*index]),
            _ => anyhow::bail!("not in a book window"),
        }
    }

    fn lookup(&self, xpath: &str, within: Option<Element>) -> Vec<Element> {
        let s = &self.selectors;
        let Some(window) = self.windows.get(&self.current) else {
            return Vec::new();
        };

        match window {
            Window::Account => {
                if xpath == s.login_email && self.site.login_form && !self.logged_in {
                    vec![Element::Email]
                } else if xpath == s.login_password && self.site.login_form && !self.logged_in {
                    vec![Element::Password]
                } else if xpath == s.login_button && self.site.login_form && !self.logged_in {
                    vec![Element::LoginButton]
                } else if xpath == s.cookies_reject_xpath() && self.cookie_banner {
                    vec![Element::CookieReject]
                } else if xpath == s.book_containers && self.logged_in {
                    (0..self.site.books.len())
                        .map(Element::BookContainer)
                        .collect()
                } else if xpath == s.book_title {
                    match within {
                        Some(Element::BookContainer(i)) if self.site.books[i].title.is_some() => {
                            vec![Element::BookTitle(i)]
                        }
                        _ => Vec::new(),
                    }
                } else {
                    Vec::new()
                }
            }
            Window::Book(index) => {
                let book = &self.site.books[*index];
                if xpath == s.popup_close && self.commercial_popup {
                    vec![Element::PopupClose]
                } else if xpath == s.nav_volumes && !self.viewer_open {
                    (0..book.volumes.len()).map(Element::Volume).collect()
                } else if xpath == s.volume_title {
                    match within {
                        Some(Element::Volume(i)) => vec![Element::VolumeTitle(i)],
                        _ => Vec::new(),
                    }
                } else if xpath == s.open_book && !self.viewer_open {
                    vec![Element::OpenBook]
                } else if xpath == s.page_input && self.viewer_open {
                    vec![Element::PageInput]
                } else if xpath == s.tool_bar && self.viewer_open {
                    vec![Element::Toolbar]
                } else if xpath == s.view_mode_link && self.viewer_open {
                    vec![Element::ViewModeLink]
                } else if xpath == s.double_page_link && self.menu_open {
                    vec![Element::DoublePageLink]
                } else if xpath == s.one_page_link && self.menu_open {
                    vec![Element::OnePageLink]
                } else if xpath == s.next_arrow && self.on_cover {
                    let at_last = self.view + 1 >= book.views.len();
                    if at_last && book.arrow_end == ArrowEnd::Absent {
                        Vec::new()
                    } else {
                        vec![Element::NextArrow]
                    }
                } else if xpath == s.main_image && self.on_cover && !self.double_page {
                    vec![Element::ViewImage {
                        view: self.view,
                        side: 0,
                    }]
                } else if xpath == s.main_image_double_page && self.on_cover && self.double_page {
                    (0..book.views[self.view].len())
                        .map(|side| Element::ViewImage {
                            view: self.view,
                            side,
                        })
                        .collect()
                } else {
                    Vec::new()
                }
            }
            Window::Image { .. } => {
                if xpath == s.tab_image {
                    vec![Element::TabImage]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn last_view(&self) -> anyhow::Result<usize> {
        Ok(self.book()?.views.len().saturating_sub(1))
    }
}

#[async_trait]
impl BrowserSession for FakeViewer {
    async fn goto(&mut self, url: &str) -> anyhow::Result<()> {
        if url.trim().is_empty() {
            anyhow::bail!("empty url");
        }
        self.windows.insert(self.current.clone(), Window::Account);
        Ok(())
    }

    async fn find_elements(
        &mut self,
        xpath: &str,
        within: Option<&ElementRef>,
    ) -> anyhow::Result<Vec<ElementRef>> {
        let within = within.map(|el| self.resolve(el)).transpose()?;
        let found = self.lookup(xpath, within);
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn text(&mut self, element: &ElementRef) -> anyhow::Result<String> {
        match self.resolve(element)? {
            Element::BookTitle(i) => Ok(format!(
                "\n  {}  \n",
                self.site.books[i].title.clone().unwrap_or_default()
            )),
            Element::VolumeTitle(i) => Ok(format!(" {} ", self.book()?.volumes[i])),
            _ => Ok(String::new()),
        }
    }

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        match (self.resolve(element)?, name) {
            (Element::ViewImage { view, side }, "src") => {
                Ok(Some(self.book()?.views[view][side].src.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn state(&mut self, element: &ElementRef) -> anyhow::Result<ElementState> {
        let element = self.resolve(element)?;
        let mut state = ElementState {
            displayed: true,
            enabled: true,
            class_name: String::new(),
            width: 100.0,
        };
        match element {
            Element::Toolbar => {
                state.class_name = if self.double_page {
                    "iplus-R-ReactPreviewFrame__toolsPageItems currentDoublePage".to_owned()
                } else {
                    "iplus-R-ReactPreviewFrame__toolsPageItems currentOnePage".to_owned()
                };
            }
            Element::NextArrow => {
                state.class_name =
                    "iplus-l-ReactPreviewFrame__paginationArrow__arrowRight".to_owned();
                if self.view >= self.last_view()? {
                    match self.book()?.arrow_end {
                        ArrowEnd::DisabledClass => state.class_name.push_str(" disabled"),
                        ArrowEnd::Hidden => state.displayed = false,
                        ArrowEnd::NotEnabled => state.enabled = false,
                        ArrowEnd::Absent => {}
                    }
                }
            }
            Element::ViewImage { view, side } => {
                state.width = self.book()?.views[view][side].width;
            }
            _ => {}
        }
        Ok(state)
    }

    async fn click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        match self.resolve(element)? {
            Element::LoginButton => self.logged_in = true,
            Element::CookieReject => self.cookie_banner = false,
            Element::BookContainer(index) => {
                self.open_window(Window::Book(index));
            }
            Element::PopupClose => self.commercial_popup = false,
            Element::Volume(i) => self.chosen_volume = Some(self.book()?.volumes[i].clone()),
            Element::OpenBook => {
                self.viewer_open = true;
                self.double_page = self.book()?.starts_in_double_page;
            }
            Element::ViewModeLink => self.menu_open = true,
            Element::TabImage => {
                if let Some(Window::Image { clicked, .. }) = self.windows.get_mut(&self.current) {
                    *clicked = true;
                }
            }
            other => anyhow::bail!("{other:?} does not respond to clicks"),
        }
        Ok(())
    }

    async fn script_click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        match self.resolve(element)? {
            Element::NextArrow => {
                if self.view < self.last_view()? {
                    self.view += 1;
                }
            }
            Element::DoublePageLink => {
                self.double_page = true;
                self.menu_open = false;
            }
            Element::OnePageLink => {
                self.double_page = false;
                self.menu_open = false;
            }
            _ => return self.click(element).await,
        }
        Ok(())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> anyhow::Result<()> {
        match self.resolve(element)? {
            Element::Email => self.email = value.to_owned(),
            Element::Password => self.password = value.to_owned(),
            Element::PageInput => self.page_input = value.to_owned(),
            other => anyhow::bail!("{other:?} is not an input"),
        }
        Ok(())
    }

    async fn submit(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        if self.resolve(element)? == Element::PageInput && self.page_input == "C1" {
            self.view = 0;
            self.on_cover = true;
        }
        Ok(())
    }

    async fn window_ids(&mut self) -> anyhow::Result<Vec<WindowId>> {
        Ok(self.windows.keys().cloned().collect())
    }

    fn current_window(&self) -> WindowId {
        self.current.clone()
    }

    async fn switch_to_window(&mut self, window: &WindowId) -> anyhow::Result<()> {
        if !self.windows.contains_key(window) {
            anyhow::bail!("no such window: {window}");
        }
        self.current = window.clone();
        Ok(())
    }

    async fn open_tab(&mut self, url: &str) -> anyhow::Result<WindowId> {
        Ok(self.open_window(Window::Image {
            src: url.to_owned(),
            clicked: false,
        }))
    }

    async fn close_window(&mut self, window: &WindowId) -> anyhow::Result<()> {
        self.windows
            .remove(window)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("no such window: {window}"))
    }

    async fn evaluate(&mut self, _script: &str) -> anyhow::Result<serde_json::Value> {
        let Some(Window::Image { src, clicked }) = self.windows.get(&self.current) else {
            return Ok(serde_json::Value::Null);
        };
        if !clicked {
            return Ok(serde_json::Value::Null);
        }
        let Some(png) = self.site.images.get(src) else {
            return Ok(serde_json::Value::Null);
        };
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        );

        self.snapshots += 1;
        if let Some((count, token)) = &self.interrupt
            && self.snapshots >= *count
        {
            token.cancel();
        }
        Ok(serde_json::Value::String(data_url))
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.shut_down = true;
        Ok(())
    }
}

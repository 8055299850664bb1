use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Config, Credentials, PageSize};
use crate::formats::PageLayout;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in, capture a book page by page, and save it.
    Run(RunArgs),
    /// Build a PDF from a directory of numbered page images.
    Assemble(AssembleArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML file overlaying the built-in settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "EMAIL", default_value = "")]
    pub email: String,

    #[arg(long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Run Chromium without a window.
    #[arg(long)]
    pub headless: bool,

    /// Page layout; asked interactively when omitted.
    #[arg(long, value_enum)]
    pub layout: Option<PageLayout>,

    /// Number given to the first captured page.
    #[arg(long)]
    pub start_page: Option<u32>,

    /// Spread sides narrower than this many CSS pixels are skipped as blank.
    #[arg(long)]
    pub blank_width: Option<f64>,

    /// Working directory for captured pages.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Directory that receives one backup per session.
    #[arg(long)]
    pub save_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Config file (or defaults) with the command-line overrides applied.
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if self.headless {
            config.browser.headless = true;
        }
        if let Some(start_page) = self.start_page {
            config.capture.start_page = start_page;
        }
        if let Some(width) = self.blank_width {
            config.capture.blank_width_threshold = width;
        }
        if let Some(dir) = &self.work_dir {
            config.output.work_dir = dir.clone();
        }
        if let Some(dir) = &self.save_dir {
            config.output.save_dir = dir.clone();
        }
        config.credentials = Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        };

        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct AssembleArgs {
    /// Directory of `<n>.png` page images (a working directory or a backup).
    #[arg(long)]
    pub images: PathBuf,

    /// Output PDF path.
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = PageSize::default().width_mm)]
    pub page_width_mm: f64,

    #[arg(long, default_value_t = PageSize::default().height_mm)]
    pub page_height_mm: f64,

    /// Overwrite `--out` if it exists.
    #[arg(long)]
    pub force: bool,
}

impl AssembleArgs {
    pub fn page_size(&self) -> PageSize {
        PageSize {
            width_mm: self.page_width_mm,
            height_mm: self.page_height_mm,
        }
    }
}

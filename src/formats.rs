use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::ElementRef;

/// A title found in the account catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Position among the catalog containers; only meaningful until the DOM changes.
    pub index: usize,
    pub title: String,
    pub handle: ElementRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSelection {
    /// The title has no sub-volumes.
    Single,
    Volume(String),
}

impl VolumeSelection {
    /// The name the output is saved under: the volume if one was chosen, else the title.
    pub fn book_name<'a>(&'a self, title: &'a str) -> &'a str {
        match self {
            Self::Single => title,
            Self::Volume(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    Single,
    Double,
}

impl PageLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }
}

/// One captured page, as written to `<page_number>.png`.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub page_number: u32,
    pub image_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStats {
    pub pages_processed: u32,
    pub errors_encountered: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub interrupted: bool,
}

impl ProcessingStats {
    pub fn start() -> Self {
        Self {
            pages_processed: 0,
            errors_encountered: 0,
            started_at: Utc::now(),
            finished_at: None,
            interrupted: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

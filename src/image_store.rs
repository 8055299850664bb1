use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::PageCapture;

pub const PAGE_EXTENSION: &str = "png";

pub fn ensure_work_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create working image dir: {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), "created working image directory");
    }
    Ok(())
}

pub fn page_path(dir: &Path, page_number: u32) -> PathBuf {
    dir.join(format!("{page_number}.{PAGE_EXTENSION}"))
}

/// Write a captured page. An existing page file is never overwritten.
pub fn write_page(dir: &Path, page: &PageCapture) -> anyhow::Result<PathBuf> {
    let path = page_path(dir, page.page_number);
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("create page image: {}", path.display()))?;
    file.write_all(&page.image_bytes)
        .with_context(|| format!("write page image: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush page image: {}", path.display()))?;
    Ok(path)
}

/// Page number encoded in a file name such as `12.png`.
pub fn page_number_of(path: &Path) -> Option<u64> {
    if path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Numbered page images in `dir`, sorted by page number rather than by name.
pub fn list_pages(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("read image dir: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(number) = page_number_of(&path) {
            pages.push((number, path));
        }
    }

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::config::OutputSettings;
use crate::image_store;

const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_NAME_CHARS: usize = 200;

/// Replace characters that are invalid in file names, trim, and cap the length.
pub fn sanitize_name(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|c| if INVALID_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>();
    replaced.trim().chars().take(MAX_NAME_CHARS).collect()
}

/// First of `base`, `base_1`, `base_2`, … that does not exist.
pub fn unique_path(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }
    let mut counter = 1_u32;
    loop {
        let mut candidate = base.as_os_str().to_owned();
        candidate.push(format!("_{counter}"));
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Copy the working images into `save_dir/<book name>[_N]`.
///
/// Returns `None` when there is no working directory to back up.
pub fn create_backup(
    work_dir: &Path,
    save_dir: &Path,
    book_name: &str,
) -> anyhow::Result<Option<PathBuf>> {
    std::fs::create_dir_all(save_dir)
        .with_context(|| format!("create backup dir: {}", save_dir.display()))?;

    if !work_dir.exists() {
        tracing::debug!(dir = %work_dir.display(), "nothing to back up");
        return Ok(None);
    }

    let mut name = sanitize_name(book_name);
    if name.is_empty() {
        name = format!("backup_{}", chrono::Utc::now().timestamp());
    }
    let backup_path = unique_path(&save_dir.join(name));

    copy_dir_recursive(work_dir, &backup_path)
        .with_context(|| format!("copy images to backup: {}", backup_path.display()))?;
    tracing::info!(backup = %backup_path.display(), "backup created");
    Ok(Some(backup_path))
}

/// Move numbered pages left behind by an earlier session into a backup so
/// a new capture starts from an empty working directory.
///
/// Pages are only removed once the backup copy exists.
pub fn stash_leftover_pages(settings: &OutputSettings) -> anyhow::Result<Option<PathBuf>> {
    if !settings.work_dir.is_dir() {
        return Ok(None);
    }
    let pages = image_store::list_pages(&settings.work_dir).context("list leftover pages")?;
    if pages.is_empty() {
        return Ok(None);
    }

    let backup = create_backup(&settings.work_dir, &settings.save_dir, "")?.ok_or_else(|| {
        anyhow::anyhow!("working dir disappeared: {}", settings.work_dir.display())
    })?;
    for page in &pages {
        std::fs::remove_file(page)
            .with_context(|| format!("remove leftover page: {}", page.display()))?;
    }

    tracing::warn!(
        pages = pages.len(),
        backup = %backup.display(),
        "moved pages from an earlier session out of the working directory"
    );
    Ok(Some(backup))
}

/// A failed backup never blocks the requested output action.
fn backup_best_effort(settings: &OutputSettings, book_name: &str) -> Option<PathBuf> {
    match create_backup(&settings.work_dir, &settings.save_dir, book_name) {
        Ok(path) => path,
        Err(err) => {
            tracing::warn!("backup creation failed: {err:#}");
            None
        }
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(to).with_context(|| format!("create dir: {}", to.display()))?;
    for entry in
        std::fs::read_dir(from).with_context(|| format!("read dir: {}", from.display()))?
    {
        let entry = entry?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&source, &target)?;
        } else {
            std::fs::copy(&source, &target).with_context(|| {
                format!("copy {} -> {}", source.display(), target.display())
            })?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfOutcome {
    pub pdf_path: PathBuf,
    pub pages: usize,
    pub backup: Option<PathBuf>,
}

/// Back up, build `<book name>.pdf`, then remove the working images.
pub fn assemble_pdf(settings: &OutputSettings, book_name: &str) -> anyhow::Result<PdfOutcome> {
    let pages = image_store::list_pages(&settings.work_dir).context("collect page images")?;
    if pages.is_empty() {
        anyhow::bail!(
            "no page images found in {}",
            settings.work_dir.display()
        );
    }

    let backup = backup_best_effort(settings, book_name);

    let mut file_stem = sanitize_name(book_name);
    if file_stem.is_empty() {
        file_stem = settings.default_book_name.clone();
    }
    let pdf_path = settings.output_dir.join(format!("{file_stem}.pdf"));

    tracing::info!(pages = pages.len(), pdf = %pdf_path.display(), "generating pdf");
    let written = crate::pdf::assemble(&pages, settings.page_size, &pdf_path, true)
        .context("assemble pdf")?;

    if let Err(err) = std::fs::remove_dir_all(&settings.work_dir) {
        tracing::warn!(
            dir = %settings.work_dir.display(),
            ?err,
            "could not remove working images"
        );
    } else {
        tracing::info!(dir = %settings.work_dir.display(), "working images removed");
    }

    Ok(PdfOutcome {
        pdf_path,
        pages: written,
        backup,
    })
}

/// Back up, then rename the working directory after the book.
///
/// The target gets a `_backup` suffix when it already exists; if the rename
/// still fails the generic book name is tried.
pub fn preserve_images(settings: &OutputSettings, book_name: &str) -> anyhow::Result<PathBuf> {
    backup_best_effort(settings, book_name);

    let mut name = sanitize_name(book_name);
    if name.is_empty() {
        name = settings.default_book_name.clone();
    }
    let mut target = settings.output_dir.join(&name);
    if target.exists() {
        target = settings.output_dir.join(format!("{name}_backup"));
    }

    match std::fs::rename(&settings.work_dir, &target) {
        Ok(()) => {
            tracing::info!(dir = %target.display(), "images preserved");
            Ok(target)
        }
        Err(err) => {
            tracing::warn!(
                target = %target.display(),
                ?err,
                "rename failed; trying generic name"
            );
            let fallback = settings.output_dir.join(&settings.default_book_name);
            std::fs::rename(&settings.work_dir, &fallback).with_context(|| {
                format!(
                    "rename {} -> {}",
                    settings.work_dir.display(),
                    fallback.display()
                )
            })?;
            tracing::info!(dir = %fallback.display(), "images preserved");
            Ok(fallback)
        }
    }
}

/// Keep the working images where they are and make sure a backup exists.
pub fn backup_and_quit(
    settings: &OutputSettings,
    book_name: &str,
) -> anyhow::Result<Option<PathBuf>> {
    create_backup(&settings.work_dir, &settings.save_dir, book_name)
}

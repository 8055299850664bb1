use std::path::Path;

use iplus_backup::config::OutputSettings;
use iplus_backup::output;

fn settings(root: &Path) -> OutputSettings {
    OutputSettings {
        work_dir: root.join("imgs"),
        save_dir: root.join("save"),
        output_dir: root.to_path_buf(),
        ..OutputSettings::default()
    }
}

fn write_pages(dir: &Path, pages: &[u32]) {
    std::fs::create_dir_all(dir).expect("create work dir");
    for page in pages {
        let img = image::RgbImage::from_pixel(8, 12, image::Rgb([10, 20, 30]));
        img.save(dir.join(format!("{page}.png"))).expect("write page");
    }
}

#[test]
fn backing_up_twice_numbers_the_second_copy() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let settings = settings(temp.path());
    write_pages(&settings.work_dir, &[0, 1]);

    let first = output::backup_and_quit(&settings, "Chimie: 5e")
        .expect("first backup")
        .expect("backup path");
    let second = output::backup_and_quit(&settings, "Chimie: 5e")
        .expect("second backup")
        .expect("backup path");

    assert_eq!(first, settings.save_dir.join("Chimie_ 5e"));
    assert_eq!(second, settings.save_dir.join("Chimie_ 5e_1"));
    assert!(second.join("1.png").is_file());
    assert!(settings.work_dir.join("0.png").is_file());
}

#[test]
fn preserving_onto_an_existing_directory_adds_backup_suffix() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let settings = settings(temp.path());
    write_pages(&settings.work_dir, &[0]);
    std::fs::create_dir(temp.path().join("Atlas")).expect("existing target");

    let preserved = output::preserve_images(&settings, "Atlas").expect("preserve");

    assert_eq!(preserved, temp.path().join("Atlas_backup"));
    assert!(preserved.join("0.png").is_file());
    assert!(!settings.work_dir.exists());
    assert!(settings.save_dir.join("Atlas").join("0.png").is_file());
}

#[test]
fn assembling_without_pages_fails_and_keeps_the_directory() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let settings = settings(temp.path());
    std::fs::create_dir_all(&settings.work_dir).expect("create work dir");

    let err = output::assemble_pdf(&settings, "Atlas").expect_err("no pages");

    assert!(format!("{err:#}").contains("no page images"), "{err:#}");
    assert!(settings.work_dir.is_dir());
    assert!(!temp.path().join("Atlas.pdf").exists());
}

#[test]
fn unnamed_book_falls_back_to_the_default_name() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let settings = settings(temp.path());
    write_pages(&settings.work_dir, &[0, 1]);

    let outcome = output::assemble_pdf(&settings, "???").expect("assemble");

    // "???" sanitises to underscores, not to an empty name.
    assert_eq!(outcome.pdf_path, temp.path().join("___.pdf"));
    assert_eq!(outcome.pages, 2);

    write_pages(&settings.work_dir, &[0]);
    let outcome = output::assemble_pdf(&settings, "   ").expect("assemble");
    assert_eq!(outcome.pdf_path, temp.path().join("book.pdf"));
}

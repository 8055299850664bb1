use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::config::PageSize;

/// Write one full-bleed page per image, in the order given.
///
/// Images that cannot be decoded are skipped with a warning. Returns the
/// number of pages written.
pub fn assemble(
    images: &[PathBuf],
    page_size: PageSize,
    out: &Path,
    overwrite: bool,
) -> anyhow::Result<usize> {
    let width = page_size.width_pt() as f32;
    let height = page_size.height_pt() as f32;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        let image_id = match embed_image(&mut doc, path) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(path = %path.display(), "skipping page image: {err:#}");
                continue;
            }
        };

        let content = format!("q {width:.2} 0 0 {height:.2} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(image_id),
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    if kids.is_empty() {
        anyhow::bail!("no page image could be added to the pdf");
    }
    let page_count = kids.len();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => Object::Integer(page_count as i64),
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = options
        .open(out)
        .with_context(|| format!("create pdf: {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer)
        .with_context(|| format!("write pdf: {}", out.display()))?;
    writer
        .flush()
        .with_context(|| format!("flush pdf: {}", out.display()))?;

    tracing::info!(pages = page_count, out = %out.display(), "pdf written");
    Ok(page_count)
}

fn embed_image(doc: &mut Document, path: &Path) -> anyhow::Result<ObjectId> {
    let decoded = image::ImageReader::open(path)
        .with_context(|| format!("open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("detect image format: {}", path.display()))?
        .decode()
        .with_context(|| format!("decode image: {}", path.display()))?;
    let rgb = decoded.to_rgb8();
    let (w, h) = rgb.dimensions();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(rgb.as_raw())
        .context("compress image data")?;
    let compressed = encoder.finish().context("finish image compression")?;

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(w)),
            "Height" => Object::Integer(i64::from(h)),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
            "Filter" => "FlateDecode",
        },
        compressed,
    );
    Ok(doc.add_object(stream))
}

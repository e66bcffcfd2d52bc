use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use spine_studio_contracts::references::{InlinePayload, ReferenceImage};
use spine_studio_contracts::slots::SlotCatalog;
use tracing::{debug, warn};

use crate::transport::mime_for_path;

/// Probes `asset_dir` for every manifest file; absent files are skipped.
pub fn load_system_references(asset_dir: &Path, catalog: &SlotCatalog) -> Vec<ReferenceImage> {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for file_name in catalog.manifest() {
        let path = asset_dir.join(file_name);
        if !path.is_file() {
            missing.push(file_name.as_str());
            continue;
        }
        let name = Path::new(file_name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or(file_name.as_str());
        found.push(ReferenceImage::system(name, path.to_string_lossy()));
    }
    if !missing.is_empty() {
        warn!(
            dir = %asset_dir.display(),
            missing = %missing.join(", "),
            "some rig images were not found"
        );
    }
    debug!(dir = %asset_dir.display(), count = found.len(), "loaded rig images");
    found
}

/// Reads an upload into an inline payload. `index` is zero-based.
pub fn load_user_image(path: &Path, index: usize) -> Result<ReferenceImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = sniff_mime(&bytes)
        .or_else(|| mime_for_path(path))
        .unwrap_or("image/png");
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default();
    Ok(ReferenceImage::user(
        file_name,
        index,
        InlinePayload::new(mime, BASE64.encode(bytes)),
    ))
}

/// Resolves a mixed list of rig names, upload paths and `data:` locators.
///
/// Rig names are looked up in `system`; anything else is read from disk
/// as an upload.
pub fn collect_pool(
    system: &[ReferenceImage],
    entries: &[String],
) -> Result<Vec<ReferenceImage>> {
    let mut pool = Vec::with_capacity(entries.len());
    let mut uploads = 0;
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some(image) = system.iter().find(|image| image.name == entry) {
            pool.push(image.clone());
            continue;
        }
        if InlinePayload::parse(entry).is_some() {
            pool.push(ReferenceImage::from_locator("", entry, uploads));
            uploads += 1;
            continue;
        }
        pool.push(load_user_image(Path::new(entry), uploads)?);
        uploads += 1;
    }
    Ok(pool)
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

use std::io::Cursor;

use image::{ImageError, ImageFormat, RgbaImage};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_TOLERANCE: f64 = 30.0;
/// Distance from black to white, rounded up.
pub const MAX_TOLERANCE: f64 = 442.0;
const TRANSPARENT_BELOW: u8 = 50;
const OPAQUE_ABOVE: u8 = 200;
const FALLBACK_BACKGROUND: [u8; 3] = [255, 255, 255];

/// The one post-processing failure callers must handle: bytes that are
/// not an image.
#[derive(Debug, Error)]
pub enum TransparencyError {
    #[error("failed to decode generated image: {0}")]
    Decode(#[source] ImageError),
    #[error("failed to encode transparent image: {0}")]
    Encode(#[source] ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransparencyOptions {
    /// Euclidean RGB distance, 0-255 per channel.
    pub tolerance: f64,
    /// Estimate the background from border pixels only.
    pub edge_sampling: bool,
    /// Use this color instead of estimating one.
    pub background: Option<[u8; 3]>,
}

impl Default for TransparencyOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            edge_sampling: true,
            background: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransparencyReport {
    pub background: [u8; 3],
    pub cleared: usize,
    pub snapped_transparent: usize,
    pub snapped_opaque: usize,
}

pub fn make_transparent(
    bytes: &[u8],
    options: &TransparencyOptions,
) -> Result<(RgbaImage, TransparencyReport), TransparencyError> {
    let mut image = image::load_from_memory(bytes)
        .map_err(TransparencyError::Decode)?
        .to_rgba8();
    let background = options
        .background
        .unwrap_or_else(|| estimate_background(&image, options.edge_sampling));
    let report = remove_background(&mut image, background, options.tolerance);
    Ok((image, report))
}

pub fn make_transparent_png(
    bytes: &[u8],
    options: &TransparencyOptions,
) -> Result<(Vec<u8>, TransparencyReport), TransparencyError> {
    let (image, report) = make_transparent(bytes, options)?;
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(TransparencyError::Encode)?;
    Ok((encoded.into_inner(), report))
}

/// Most frequent exact RGB triple; ties go to the one seen first.
///
/// Border order is top and bottom for each column, then left and right for
/// each row. Corners are counted twice.
pub fn estimate_background(image: &RgbaImage, edge_sampling: bool) -> [u8; 3] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return FALLBACK_BACKGROUND;
    }

    let mut histogram: IndexMap<[u8; 3], usize> = IndexMap::new();
    let mut count = |x: u32, y: u32| {
        let pixel = image.get_pixel(x, y);
        *histogram.entry([pixel[0], pixel[1], pixel[2]]).or_insert(0) += 1;
    };
    if edge_sampling {
        for x in 0..width {
            count(x, 0);
            count(x, height - 1);
        }
        for y in 0..height {
            count(0, y);
            count(width - 1, y);
        }
    } else {
        for y in 0..height {
            for x in 0..width {
                count(x, y);
            }
        }
    }

    let mut best: Option<([u8; 3], usize)> = None;
    for (color, hits) in histogram {
        if best.map_or(true, |(_, top)| hits > top) {
            best = Some((color, hits));
        }
    }
    best.map(|(color, _)| color).unwrap_or(FALLBACK_BACKGROUND)
}

/// Clears pixels within `tolerance` of `background`, then snaps fringe
/// alpha to fully transparent or fully opaque.
pub fn remove_background(
    image: &mut RgbaImage,
    background: [u8; 3],
    tolerance: f64,
) -> TransparencyReport {
    let mut report = TransparencyReport {
        background,
        cleared: 0,
        snapped_transparent: 0,
        snapped_opaque: 0,
    };

    for pixel in image.pixels_mut() {
        if color_distance([pixel[0], pixel[1], pixel[2]], background) <= tolerance {
            pixel[3] = 0;
            report.cleared += 1;
        }
    }

    for pixel in image.pixels_mut() {
        let alpha = pixel[3];
        if alpha == 0 || alpha == 255 {
            continue;
        }
        if alpha < TRANSPARENT_BELOW {
            pixel[3] = 0;
            report.snapped_transparent += 1;
        } else if alpha > OPAQUE_ABOVE {
            pixel[3] = 255;
            report.snapped_opaque += 1;
        }
    }

    report
}

pub fn color_distance(left: [u8; 3], right: [u8; 3]) -> f64 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| {
            let delta = f64::from(*a) - f64::from(*b);
            delta * delta
        })
        .sum::<f64>()
        .sqrt()
}

/// Parses `#rrggbb` or `rrggbb`.
pub fn parse_hex_color(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode test image");
        out.into_inner()
    }

    fn sprite() -> RgbaImage {
        // White canvas with a red 4x4 square in the middle.
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        for y in 2..6 {
            for x in 2..6 {
                image.put_pixel(x, y, Rgba([200, 30, 30, 255]));
            }
        }
        image
    }

    #[test]
    fn solid_image_becomes_fully_transparent() -> Result<(), TransparencyError> {
        let image = RgbaImage::from_pixel(5, 3, Rgba([12, 200, 90, 255]));
        let (out, report) = make_transparent(&png_bytes(&image), &TransparencyOptions::default())?;
        assert!(out.pixels().all(|pixel| pixel[3] == 0));
        assert_eq!(report.cleared, 15);
        assert_eq!(report.background, [12, 200, 90]);
        Ok(())
    }

    #[test]
    fn far_background_leaves_alpha_untouched() -> Result<(), TransparencyError> {
        let image = sprite();
        let options = TransparencyOptions {
            background: Some([0, 0, 255]),
            ..TransparencyOptions::default()
        };
        let (out, report) = make_transparent(&png_bytes(&image), &options)?;
        assert!(out.pixels().all(|pixel| pixel[3] == 255));
        assert_eq!(report.cleared, 0);
        Ok(())
    }

    #[test]
    fn sprite_keeps_foreground_and_drops_canvas() -> Result<(), TransparencyError> {
        let (out, report) =
            make_transparent(&png_bytes(&sprite()), &TransparencyOptions::default())?;
        assert_eq!(report.background, [255, 255, 255]);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(3, 3)[3], 255);
        assert_eq!(report.cleared, 64 - 16);
        Ok(())
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255]));
        // Distance exactly 30 along one channel, then just past it.
        image.put_pixel(0, 0, Rgba([130, 100, 100, 255]));
        image.put_pixel(1, 0, Rgba([131, 100, 100, 255]));
        let report = remove_background(&mut image, [100, 100, 100], 30.0);
        assert_eq!(report.cleared, 1);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
        assert_eq!(image.get_pixel(1, 0)[3], 255);
    }

    #[test]
    fn fringe_alpha_snaps_to_extremes() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 40]));
        image.put_pixel(1, 0, Rgba([0, 0, 0, 120]));
        image.put_pixel(2, 0, Rgba([0, 0, 0, 230]));
        let report = remove_background(&mut image, [255, 255, 255], 30.0);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
        assert_eq!(image.get_pixel(1, 0)[3], 120);
        assert_eq!(image.get_pixel(2, 0)[3], 255);
        assert_eq!(report.snapped_transparent, 1);
        assert_eq!(report.snapped_opaque, 1);
    }

    #[test]
    fn histogram_ties_keep_first_seen_color() {
        // Top row red, bottom row blue: equal border counts, red sampled first.
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        image.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        assert_eq!(estimate_background(&image, true), [255, 0, 0]);
        assert_eq!(estimate_background(&image, false), [255, 0, 0]);
        assert_eq!(estimate_background(&RgbaImage::new(0, 0), true), [255, 255, 255]);
    }

    #[test]
    fn edge_sampling_ignores_interior() {
        // 24 dark border pixels around 25 light interior ones.
        let mut image = RgbaImage::from_pixel(7, 7, Rgba([10, 10, 10, 255]));
        for y in 1..6 {
            for x in 1..6 {
                image.put_pixel(x, y, Rgba([250, 250, 250, 255]));
            }
        }
        assert_eq!(estimate_background(&image, true), [10, 10, 10]);
        assert_eq!(estimate_background(&image, false), [250, 250, 250]);
    }

    #[test]
    fn undecodable_bytes_are_reported() {
        let err = make_transparent(b"definitely not a png", &TransparencyOptions::default())
            .expect_err("garbage input");
        assert!(matches!(err, TransparencyError::Decode(_)));
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#FFffFF"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("102030"), Some([16, 32, 48]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }
}

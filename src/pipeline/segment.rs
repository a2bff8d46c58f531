//! Region segmentation: split a page into rectangular content blocks.
//!
//! Spec sheets are drawn as a grid of framed boxes, one fixture per box.
//! Sending each box on its own keeps the model focused on a single fixture.
//!
//! ## Algorithm
//!
//! 1. grayscale
//! 2. Canny edges with fixed hysteresis thresholds (default 50 / 150)
//! 3. outermost contours only; contours nested inside another are ignored
//! 4. axis-aligned bounding rectangle per contour
//! 5. drop rectangles with `width <= min_width` or `height <= min_height`
//! 6. sort by top, then left, and number from 1
//!
//! Overlapping rectangles are neither merged nor deduplicated, and a page with
//! no large enough contour yields no regions. Thresholds are absolute pixels,
//! so they assume the rasteriser's fixed DPI.

use crate::config::SegmentConfig;
use crate::error::OcrError;
use crate::pipeline::encode::save_png;
use image::DynamicImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A detected rectangle within a page image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// 1-based position in reading order.
    pub order: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Artefact name for this region of page `page`.
    pub fn filename(&self, page: usize) -> String {
        format!("page_{}_part_{}.png", page, self.order)
    }
}

/// Detect content regions in `img`, sorted top-to-bottom then left-to-right.
pub fn segment_image(img: &DynamicImage, config: &SegmentConfig) -> Vec<Region> {
    let gray = img.to_luma8();
    let edges = canny(&gray, config.canny_low, config.canny_high);

    let mut rects: Vec<(u32, u32, u32, u32)> = find_contours::<u32>(&edges)
        .iter()
        .filter(|c| is_external(c))
        .filter_map(bounding_rect)
        .filter(|&(_, _, w, h)| w > config.min_width && h > config.min_height)
        .collect();

    rects.sort_by_key(|&(x, y, _, _)| (y, x));

    let regions: Vec<Region> = rects
        .into_iter()
        .enumerate()
        .map(|(i, (x, y, width, height))| Region {
            order: i + 1,
            x,
            y,
            width,
            height,
        })
        .collect();

    debug!(
        "Segmented {}x{} image into {} regions",
        img.width(),
        img.height(),
        regions.len()
    );
    regions
}

/// Outer border with no enclosing contour.
fn is_external(contour: &Contour<u32>) -> bool {
    contour.border_type == BorderType::Outer && contour.parent.is_none()
}

/// `(x, y, width, height)`, inclusive of both edge pixels.
fn bounding_rect(contour: &Contour<u32>) -> Option<(u32, u32, u32, u32)> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Cut `region` out of `img`.
pub fn crop_region(img: &DynamicImage, region: &Region) -> DynamicImage {
    img.crop_imm(region.x, region.y, region.width, region.height)
}

/// Crop and persist each region as `dir/page_{page}_part_{order}.png`.
pub fn save_regions(
    img: &DynamicImage,
    regions: &[Region],
    page: usize,
    dir: &Path,
) -> Result<Vec<PathBuf>, OcrError> {
    std::fs::create_dir_all(dir).map_err(|e| OcrError::ArtifactWriteFailed {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    regions
        .iter()
        .map(|region| {
            let path = dir.join(region.filename(page));
            save_png(&crop_region(img, region), &path)?;
            Ok(path)
        })
        .collect()
}

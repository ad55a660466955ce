//! C1 — image primitives: RGBA<->greyscale<->binary conversion, extents, crop.

use image::RgbaImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Pixel offsets of a crop in its parent image's coordinate system:
/// `(x0, x1, y1, y0)`, matching the column-major convention used
/// throughout the reader hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub x0: u32,
    pub x1: u32,
    pub y1: u32,
    pub y0: u32,
}

impl Extent {
    pub fn new(x0: u32, x1: u32, y0: u32, y1: u32) -> Self {
        Extent { x0, x1, y1, y0 }
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y0.max(self.y1) - self.y0.min(self.y1)
    }
}

/// Convert an RGBA image to greyscale following the original thresholding
/// convention: the sum of the three colour channels is compared against
/// `threshold` (0..765, default 690 == 230 per channel). Pixels with
/// alpha == 0, or whose channel sum exceeds the threshold, are background
/// (0); everything else maps to `luminance + 1` so valid pixels occupy
/// 1..=255 and 0 is reserved for "no data".
pub fn to_greyscale(rgba: &RgbaImage, threshold: u32) -> Array2<u8> {
    let (w, h) = rgba.dimensions();
    let mut out = Array2::<u8>::zeros((h as usize, w as usize));
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        if a == 0 {
            continue;
        }
        let sum = r as u32 + g as u32 + b as u32;
        if sum > threshold {
            continue;
        }
        // luminance via the standard Rec. 601 weighting, clamped into 0..=254
        let lum = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8;
        out[(y as usize, x as usize)] = lum.saturating_add(1);
    }
    out
}

/// `(greyscale > 0) as u8`.
pub fn to_binary(rgba: &RgbaImage, threshold: u32) -> Array2<u8> {
    to_greyscale(rgba, threshold).mapv(|v| (v > 0) as u8)
}

/// Binarize an already-computed greyscale array.
pub fn binary_from_greyscale(grey: &Array2<u8>) -> Array2<u8> {
    grey.mapv(|v| (v > 0) as u8)
}

/// Crop an RGBA image to `extent`, returning the crop and a clamped extent.
pub fn crop_rgba(rgba: &RgbaImage, extent: Extent) -> (RgbaImage, Extent) {
    let (w, h) = rgba.dimensions();
    let x0 = extent.x0.min(w);
    let x1 = extent.x1.min(w).max(x0);
    let (ytop, ybot) = (extent.y1.min(extent.y0), extent.y1.max(extent.y0));
    let y0 = ytop.min(h);
    let y1 = ybot.min(h).max(y0);
    let cropped = image::imageops::crop_imm(rgba, x0, y0, x1 - x0, y1 - y0).to_image();
    (cropped, Extent::new(x0, x1, y0, y1))
}

/// Crop a 2-D array (binary or label array) to crop-local row/col bounds.
pub fn crop_array<T: Clone>(arr: &Array2<T>, x0: usize, x1: usize, y0: usize, y1: usize) -> Array2<T> {
    arr.slice(ndarray::s![y0..y1, x0..x1]).to_owned()
}

/// Translate a crop-local coordinate back into the parent image's
/// coordinate system using `extent`.
pub fn to_parent_coords(extent: &Extent, x_local: i64, y_local: i64) -> (i64, i64) {
    (x_local + extent.x0 as i64, y_local + extent.y0.min(extent.y1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(w, h, px)
    }

    #[test]
    fn binary_invariant_matches_greyscale() {
        let mut img = solid(4, 4, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([10, 10, 10, 0])); // alpha 0 -> background
        let grey = to_greyscale(&img, 690);
        let bin = to_binary(&img, 690);
        for y in 0..4usize {
            for x in 0..4usize {
                assert_eq!(bin[(y, x)], (grey[(y, x)] > 0) as u8);
            }
        }
        assert_eq!(bin[(0, 0)], 1);
        assert_eq!(bin[(1, 1)], 0);
        assert_eq!(bin[(0, 1)], 0); // near-white suppressed by default threshold
    }

    #[test]
    fn crop_extent_clamps_to_bounds() {
        let img = solid(10, 10, Rgba([0, 0, 0, 255]));
        let (cropped, extent) = crop_rgba(&img, Extent::new(5, 20, 0, 20));
        assert_eq!(cropped.dimensions(), (5, 10));
        assert_eq!(extent, Extent::new(5, 10, 0, 10));
    }
}

//! C5 — reader hierarchy. A reader converts a cropped binary image into
//! a per-column digitized series. Readers form a tree (one parent plus
//! its children, plus an optional exaggeration sibling per non-exaggerated
//! reader) but are stored flat in the straditizer's arena and addressed
//! by index, to avoid the original's parent/child cyclic references.

pub mod digitize;
pub mod exaggerate;

use image::RgbaImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::axes::AxisMapping;
use crate::image_ops::Extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderKind {
    Area,
    Line,
    Bar,
    RoundedBar,
    StackedArea,
}

impl ReaderKind {
    pub fn default_tolerance(self) -> i64 {
        match self {
            ReaderKind::RoundedBar => 10,
            _ => 2,
        }
    }
}

/// Bar-reader-specific state (rectangular and rounded variants), kept
/// separate from the generic digitization output so a caller can review
/// "too long" bars and their split candidates before accepting them.
#[derive(Debug, Clone, Default)]
pub struct BarState {
    pub tolerance: i64,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub bars: Vec<digitize::Bar>,
    pub too_long: Vec<digitize::Bar>,
    pub split_candidates: Vec<Vec<digitize::Bar>>,
    /// `full_data` before bar segmentation collapsed it to per-bar
    /// maxima; kept so a reviewer can compare.
    pub full_data_orig: Option<Vec<f64>>,
}

/// Stacked-area-reader state: bands are added incrementally by user
/// selection, each becoming one more owned column; `band_order` records
/// the order they were stacked in (needed to recompute the cumulative
/// width beneath a band when it is later updated), separately from
/// `columns`, which stays sorted for the partition invariant.
#[derive(Debug, Clone, Default)]
pub struct StackedState {
    pub bands_added: usize,
    pub band_order: Vec<usize>,
}

/// One node in the reader tree. `parent == index` marks a parent reader.
pub struct Reader {
    pub index: usize,
    pub parent: usize,
    pub children: Vec<usize>,
    pub columns: Vec<usize>,
    pub is_exaggerated: f64,
    pub kind: ReaderKind,
    pub image: RgbaImage,
    pub binary: Array2<u8>,
    pub labels: Array2<i64>,
    pub extent: Extent,
    pub xaxis: Option<AxisMapping>,
    pub occurrences: HashSet<(i64, i64)>,
    pub bar_state: Option<BarState>,
    pub stacked_state: Option<StackedState>,
}

impl Reader {
    pub fn new(index: usize, kind: ReaderKind, image: RgbaImage, binary: Array2<u8>, extent: Extent) -> Self {
        let (labels, _) = crate::labeling::label(&binary);
        let bar_state = match kind {
            ReaderKind::Bar | ReaderKind::RoundedBar => Some(BarState {
                tolerance: kind.default_tolerance(),
                ..Default::default()
            }),
            _ => None,
        };
        let stacked_state = match kind {
            ReaderKind::StackedArea => Some(StackedState::default()),
            _ => None,
        };
        Reader {
            index,
            parent: index,
            children: vec![],
            columns: vec![],
            is_exaggerated: 0.0,
            kind,
            image,
            binary,
            labels,
            extent,
            xaxis: None,
            occurrences: HashSet::new(),
            bar_state,
            stacked_state,
        }
    }

    pub fn is_parent(&self) -> bool {
        self.parent == self.index
    }

    pub fn column_width(&self, col: usize, column_starts: &[usize], column_ends: &[usize]) -> usize {
        column_ends[col].saturating_sub(column_starts[col])
    }

    /// Apply a per-column vertical pixel shift to this reader's own
    /// crop-local arrays (binary, labels, image) and, for bar readers,
    /// to already-segmented bar bounds. Positive `pixels` shifts content
    /// downward; rows shifted out of range are dropped, rows shifted in
    /// are filled with background/zero.
    pub fn shift_vertical(&mut self, pixels: i64) {
        if pixels == 0 {
            return;
        }
        self.binary = shift_rows(&self.binary, pixels, 0u8);
        self.labels = shift_rows(&self.labels, pixels, 0i64);
        self.image = shift_image_rows(&self.image, pixels);
        if let Some(bs) = &mut self.bar_state {
            for b in bs.bars.iter_mut().chain(bs.too_long.iter_mut()) {
                b.lo = (b.lo as i64 + pixels).max(0) as usize;
                b.hi = (b.hi as i64 + pixels).max(0) as usize;
            }
        }
    }
}

fn shift_rows<T: Clone + Default>(arr: &Array2<T>, pixels: i64, fill: T) -> Array2<T> {
    let (h, w) = arr.dim();
    let mut out = Array2::from_elem((h, w), fill);
    for y in 0..h {
        let src_y = y as i64 - pixels;
        if src_y >= 0 && (src_y as usize) < h {
            for x in 0..w {
                out[(y, x)] = arr[(src_y as usize, x)].clone();
            }
        }
    }
    out
}

fn shift_image_rows(img: &RgbaImage, pixels: i64) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut out = RgbaImage::new(w, h);
    for y in 0..h {
        let src_y = y as i64 - pixels;
        if src_y >= 0 && (src_y as u32) < h {
            for x in 0..w {
                out.put_pixel(x, y, *img.get_pixel(x, src_y as u32));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use ndarray::array;

    #[test]
    fn new_reader_is_its_own_parent() {
        let bin: Array2<u8> = array![[0, 1], [1, 0]];
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let r = Reader::new(0, ReaderKind::Area, img, bin, Extent::new(0, 2, 0, 2));
        assert!(r.is_parent());
        assert_eq!(r.parent, r.index);
    }

    #[test]
    fn shift_vertical_moves_binary_rows() {
        let bin: Array2<u8> = array![[1, 0], [0, 0], [0, 0]];
        let img = RgbaImage::from_pixel(2, 3, Rgba([0, 0, 0, 255]));
        let mut r = Reader::new(0, ReaderKind::Area, img, bin, Extent::new(0, 2, 0, 3));
        r.shift_vertical(1);
        assert_eq!(r.binary[(1, 0)], 1);
        assert_eq!(r.binary[(0, 0)], 0);
    }
}

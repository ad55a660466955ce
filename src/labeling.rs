//! C2 — 8-connected labeling and the selection algebra used by the
//! artifact removers and the occurrence picker.

use ndarray::Array2;

/// Union-find used by the two-pass labeling algorithm.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Label an 8-connected binary image. `0` stays background; foreground
/// components get positive ids assigned in first-seen row-major scan
/// order (deterministic regardless of component shape).
///
/// Returns `(labels, num_labels)`.
pub fn label(binary: &Array2<u8>) -> (Array2<i64>, i64) {
    let (h, w) = binary.dim();
    let mut provisional = Array2::<usize>::zeros((h, w));
    let mut uf = UnionFind::new(h * w + 1);
    let mut next_id = 1usize;

    // First pass: assign provisional ids, unioning with already-visited
    // 8-neighbours (up, up-left, up-right, left).
    for y in 0..h {
        for x in 0..w {
            if binary[(y, x)] == 0 {
                continue;
            }
            let mut neighbours = Vec::with_capacity(4);
            if x > 0 && provisional[(y, x - 1)] != 0 {
                neighbours.push(provisional[(y, x - 1)]);
            }
            if y > 0 {
                if provisional[(y - 1, x)] != 0 {
                    neighbours.push(provisional[(y - 1, x)]);
                }
                if x > 0 && provisional[(y - 1, x - 1)] != 0 {
                    neighbours.push(provisional[(y - 1, x - 1)]);
                }
                if x + 1 < w && provisional[(y - 1, x + 1)] != 0 {
                    neighbours.push(provisional[(y - 1, x + 1)]);
                }
            }
            if neighbours.is_empty() {
                provisional[(y, x)] = next_id;
                next_id += 1;
            } else {
                let first = neighbours[0];
                provisional[(y, x)] = first;
                for &n in &neighbours[1..] {
                    uf.union(first, n);
                }
            }
        }
    }

    // Second pass: resolve to canonical roots, then renumber roots in
    // first-seen scan order so label ids are stable/deterministic.
    let mut root_to_label = vec![0i64; h * w + 1];
    let mut labels = Array2::<i64>::zeros((h, w));
    let mut next_label = 1i64;
    for y in 0..h {
        for x in 0..w {
            let p = provisional[(y, x)];
            if p == 0 {
                continue;
            }
            let root = uf.find(p);
            if root_to_label[root] == 0 {
                root_to_label[root] = next_label;
                next_label += 1;
            }
            labels[(y, x)] = root_to_label[root];
        }
    }

    (labels, next_label - 1)
}

/// Remove components smaller than `min_size` from a boolean mask,
/// returning the mask restricted to the surviving components.
pub fn remove_small_objects(mask: &Array2<bool>, min_size: usize) -> Array2<bool> {
    let bin = mask.mapv(|v| v as u8);
    let (labels, num_labels) = label(&bin);
    let mut sizes = vec![0usize; (num_labels + 1) as usize];
    for &l in labels.iter() {
        if l > 0 {
            sizes[l as usize] += 1;
        }
    }
    labels.mapv(|l| l > 0 && sizes[l as usize] >= min_size)
}

/// A bounding box, used by `highlight_small` to draw attention to small
/// components. Coordinates are crop-local and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub y0: usize,
    pub x0: usize,
    pub y1: usize,
    pub x1: usize,
}

/// Mutable selection state layered on top of a label array: `array` is
/// the live, mutable selection; `original` is frozen at construction.
/// Invariant: any cell equal to `original` (and nonzero) or `> num_labels`
/// is "selected"; a cell at `-1` is explicitly cleared.
#[derive(Debug, Clone)]
pub struct Selection {
    pub array: Array2<i64>,
    pub original: Array2<i64>,
    pub num_labels: i64,
}

impl Selection {
    pub fn new(labels: Array2<i64>, num_labels: i64) -> Self {
        Selection {
            array: labels.clone(),
            original: labels,
            num_labels,
        }
    }

    pub fn from_labeling(binary: &Array2<u8>) -> Self {
        let (labels, num_labels) = label(binary);
        Selection::new(labels, num_labels)
    }

    pub fn is_selected_at(&self, idx: (usize, usize)) -> bool {
        let cur = self.array[idx];
        let orig = self.original[idx];
        (cur == orig && orig != 0) || cur > self.num_labels
    }

    pub fn selected_mask(&self) -> Array2<bool> {
        Array2::from_shape_fn(self.array.dim(), |idx| self.is_selected_at(idx))
    }

    pub fn select_all(&mut self) {
        self.array = self.original.clone();
    }

    pub fn unselect_all(&mut self) {
        let num_labels = self.num_labels;
        self.array.mapv_inplace(|cur| {
            if cur > 0 && cur <= num_labels {
                0
            } else {
                cur
            }
        });
    }

    pub fn invert(&mut self) {
        let num_labels = self.num_labels;
        let mask = self.selected_mask();
        ndarray::Zip::from(&mut self.array)
            .and(&self.original)
            .and(&mask)
            .for_each(|cur, &orig, &was_selected| {
                if was_selected {
                    *cur = num_labels + 1;
                } else if orig > 0 {
                    *cur = orig;
                }
            });
    }

    /// For every currently-selected cell, select the entire connected
    /// component (as defined by `original`) that it belongs to.
    pub fn expand_to_label(&mut self) {
        let mask = self.selected_mask();
        let mut touched = std::collections::HashSet::new();
        ndarray::Zip::from(&self.original)
            .and(&mask)
            .for_each(|&orig, &sel| {
                if sel && orig > 0 {
                    touched.insert(orig);
                }
            });
        ndarray::Zip::from(&mut self.array)
            .and(&self.original)
            .for_each(|cur, &orig| {
                if orig > 0 && touched.contains(&orig) {
                    *cur = orig;
                }
            });
    }

    /// Toggle the label at a crop-local coordinate: select it if it was
    /// unselected (or not part of the current selection), unselect it
    /// otherwise. A no-op on background.
    pub fn pick_label(&mut self, y: usize, x: usize) {
        let orig = self.original[(y, x)];
        if orig == 0 {
            return;
        }
        if self.is_selected_at((y, x)) {
            self.array[(y, x)] = -1;
        } else {
            self.array[(y, x)] = orig;
        }
    }

    /// Relabel the selected pixels belonging to components smaller than
    /// `n`, returning the relabeled candidate array plus a bounding box
    /// per surviving component (padded to at least 5% of the image's
    /// width/height, for visual attention by a GUI layer).
    pub fn highlight_small(&self, n: usize) -> (Array2<i64>, Vec<BoundingBox>) {
        let selected = self.selected_mask();
        let kept = remove_small_objects(&selected, n);
        let small = Array2::from_shape_fn(selected.dim(), |idx| selected[idx] && !kept[idx]);
        let small_u8 = small.mapv(|v| v as u8);
        let (labels, num_labels) = label(&small_u8);

        let (h, w) = selected.dim();
        let min_h = ((h as f64) * 0.05).ceil() as usize;
        let min_w = ((w as f64) * 0.05).ceil() as usize;

        let mut boxes = vec![None; (num_labels + 1) as usize];
        for y in 0..h {
            for x in 0..w {
                let l = labels[(y, x)];
                if l == 0 {
                    continue;
                }
                let entry = boxes[l as usize].get_or_insert(BoundingBox {
                    y0: y,
                    x0: x,
                    y1: y,
                    x1: x,
                });
                entry.y0 = entry.y0.min(y);
                entry.x0 = entry.x0.min(x);
                entry.y1 = entry.y1.max(y);
                entry.x1 = entry.x1.max(x);
            }
        }
        let result = boxes
            .into_iter()
            .flatten()
            .map(|mut b| {
                if b.y1 - b.y0 + 1 < min_h {
                    let pad = (min_h - (b.y1 - b.y0 + 1) + 1) / 2;
                    b.y0 = b.y0.saturating_sub(pad);
                    b.y1 = (b.y1 + pad).min(h.saturating_sub(1));
                }
                if b.x1 - b.x0 + 1 < min_w {
                    let pad = (min_w - (b.x1 - b.x0 + 1) + 1) / 2;
                    b.x0 = b.x0.saturating_sub(pad);
                    b.x1 = (b.x1 + pad).min(w.saturating_sub(1));
                }
                b
            })
            .collect();
        (labels, result)
    }

    /// For every registered sibling array (e.g. the RGBA image, binary
    /// array, or an exaggeration reader's binary), zero out cells that
    /// are selected (or explicitly added above `num_labels`), invoking
    /// each callback with `(mask)` first so collaborators can observe
    /// the write before it happens.
    pub fn remove_selected(
        &mut self,
        siblings: &mut [&mut dyn SiblingArray],
        callbacks: &[Box<dyn Fn(&Array2<bool>)>],
    ) {
        let mask = self.selected_mask();
        for cb in callbacks {
            cb(&mask);
        }
        for sibling in siblings.iter_mut() {
            sibling.zero_where(&mask);
        }
        // Clear the selection itself: removed pixels no longer exist.
        ndarray::Zip::from(&mut self.array)
            .and(&mut self.original)
            .and(&mask)
            .for_each(|cur, orig, &sel| {
                if sel {
                    *cur = 0;
                    *orig = 0;
                }
            });
    }
}

/// An array that can be masked in-place by `remove_selected`; implemented
/// for the RGBA image, binary arrays, and any sibling reader's binary.
pub trait SiblingArray {
    fn zero_where(&mut self, mask: &Array2<bool>);
}

impl SiblingArray for Array2<u8> {
    fn zero_where(&mut self, mask: &Array2<bool>) {
        ndarray::Zip::from(self).and(mask).for_each(|v, &m| {
            if m {
                *v = 0;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn labels_two_diagonal_blobs_are_8_connected() {
        let bin: Array2<u8> = array![[1, 0, 0], [0, 1, 0], [0, 0, 1]];
        let (labels, num_labels) = label(&bin);
        assert_eq!(num_labels, 1);
        assert_eq!(labels[(0, 0)], labels[(2, 2)]);
    }

    #[test]
    fn labels_bounded_and_nonnegative() {
        let bin: Array2<u8> = array![[1, 1, 0], [0, 0, 1], [1, 0, 1]];
        let (labels, num_labels) = label(&bin);
        for &l in labels.iter() {
            assert!(l >= 0 && l <= num_labels);
        }
    }

    #[test]
    fn invert_selection_swaps_selected_and_unselected() {
        let bin: Array2<u8> = array![[1, 1], [1, 1]];
        let mut sel = Selection::from_labeling(&bin);
        sel.unselect_all();
        assert!(!sel.is_selected_at((0, 0)));
        sel.invert();
        // after invert, previously-unselected positive-original cells
        // should become selected (equal to original)
        assert!(sel.is_selected_at((0, 0)));
    }

    #[test]
    fn remove_selected_zeroes_sibling_arrays() {
        let bin: Array2<u8> = array![[1, 0], [0, 1]];
        let mut sel = Selection::from_labeling(&bin);
        sel.select_all();
        let mut sibling = bin.clone();
        let mut refs: Vec<&mut dyn SiblingArray> = vec![&mut sibling];
        sel.remove_selected(&mut refs, &[]);
        assert_eq!(sibling, Array2::<u8>::zeros((2, 2)));
    }
}

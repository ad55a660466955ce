//! C4 — artifact removers. Each recognizer returns a label array of
//! candidate pixels for review; the caller decides whether to apply them
//! (zero the pixels in `binary`/`labels` and, for lines, record the
//! removed row/column indices for later interpolation).

use ndarray::Array2;
use std::collections::HashSet;

use crate::labeling::{label, remove_small_objects};

/// Rows (or columns, for `recognize_vlines`) found by a full-width/height
/// line detector, restricted to an optional column-bound window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineLocs(pub Vec<usize>);

/// Detect rows that are (near-)fully foreground across the image width,
/// restricted to `[x0, x1)` if given (used by `recognize_xaxes` to scope
/// detection to a single column).
///
/// `min_lw`/`max_lw` filter consecutive-row runs by length; at most
/// `max_lw` rows are kept per run (the ones closest to the run's start).
pub fn recognize_hlines(
    binary: &Array2<u8>,
    frac: f64,
    min_lw: u32,
    max_lw: Option<u32>,
    x_range: Option<(usize, usize)>,
) -> LineLocs {
    let (h, w) = binary.dim();
    let (x0, x1) = x_range.unwrap_or((0, w));
    let span = (x1 - x0).max(1) as f64;
    let mut is_line = vec![false; h];
    for y in 0..h {
        let mut count = 0u64;
        for x in x0..x1 {
            if binary[(y, x)] != 0 {
                count += 1;
            }
        }
        is_line[y] = (count as f64) / span >= frac;
    }
    LineLocs(filter_runs(&is_line, min_lw, max_lw))
}

/// Symmetric to `recognize_hlines`, over columns.
pub fn recognize_vlines(
    binary: &Array2<u8>,
    frac: f64,
    min_lw: u32,
    max_lw: Option<u32>,
    y_range: Option<(usize, usize)>,
) -> LineLocs {
    let (h, w) = binary.dim();
    let (y0, y1) = y_range.unwrap_or((0, h));
    let span = (y1 - y0).max(1) as f64;
    let mut is_line = vec![false; w];
    for x in 0..w {
        let mut count = 0u64;
        for y in y0..y1 {
            if binary[(y, x)] != 0 {
                count += 1;
            }
        }
        is_line[x] = (count as f64) / span >= frac;
    }
    LineLocs(filter_runs(&is_line, min_lw, max_lw))
}

/// `recognize_xaxes`: apply `recognize_hlines` per column bound so that
/// per-column x-axes are found individually, merging the results.
pub fn recognize_xaxes(
    binary: &Array2<u8>,
    frac: f64,
    min_lw: u32,
    max_lw: Option<u32>,
    column_bounds: &[(usize, usize)],
) -> LineLocs {
    let mut all: HashSet<usize> = HashSet::new();
    for &(x0, x1) in column_bounds {
        for r in recognize_hlines(binary, frac, min_lw, max_lw, Some((x0, x1))).0 {
            all.insert(r);
        }
    }
    let mut v: Vec<usize> = all.into_iter().collect();
    v.sort_unstable();
    LineLocs(v)
}

/// `recognize_yaxes`: as above but scoped per column along rows, i.e. a
/// vertical line detector restricted to each column's own row extent
/// (here the full row range, since rows are shared across columns; kept
/// as a distinct entry point per the component design).
pub fn recognize_yaxes(binary: &Array2<u8>, frac: f64, min_lw: u32, max_lw: Option<u32>) -> LineLocs {
    recognize_vlines(binary, frac, min_lw, max_lw, None)
}

fn filter_runs(is_line: &[bool], min_lw: u32, max_lw: Option<u32>) -> Vec<usize> {
    let n = is_line.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        if !is_line[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && is_line[i] {
            i += 1;
        }
        let len = (i - start) as u32;
        if len < min_lw {
            continue;
        }
        let keep = max_lw.map(|m| (m as usize).min(len as usize)).unwrap_or(len as usize);
        out.extend(start..start + keep);
    }
    out
}

/// `show_disconnected_parts`: within each column, a foreground pixel
/// belongs to a "disconnected" candidate if, scanning its row, there is a
/// gap of at least `fromlast` columns to the previous foreground pixel
/// carrying a different label, AND the pixel itself is at least `from0`
/// columns past the column start. A whole label becomes a candidate only
/// if *every* one of its pixels satisfies the criterion.
pub fn show_disconnected_parts(
    binary: &Array2<u8>,
    labels: &Array2<i64>,
    column_bounds: &[(usize, usize)],
    fromlast: u32,
    from0: u32,
) -> HashSet<i64> {
    let (h, _w) = binary.dim();
    let mut all_qualify: HashSet<i64> = HashSet::new();
    let mut disqualified: HashSet<i64> = HashSet::new();

    for &(x0, x1) in column_bounds {
        for y in 0..h {
            let mut last_fg: Option<(usize, i64)> = None;
            for x in x0..x1 {
                if binary[(y, x)] == 0 {
                    continue;
                }
                let lbl = labels[(y, x)];
                let far_enough = (x - x0) as u32 >= from0;
                let gapped = match last_fg {
                    None => true,
                    Some((lx, llbl)) => llbl != lbl && (x - lx) as u32 >= fromlast as u32,
                };
                if far_enough && gapped {
                    all_qualify.insert(lbl);
                } else {
                    disqualified.insert(lbl);
                }
                last_fg = Some((x, lbl));
            }
        }
    }
    all_qualify.difference(&disqualified).copied().collect()
}

/// `show_cross_column_features`: labels with at least `min_px` pixels in
/// two or more distinct columns.
pub fn show_cross_column_features(
    labels: &Array2<i64>,
    column_bounds: &[(usize, usize)],
    min_px: usize,
) -> HashSet<i64> {
    let mut per_label_cols: std::collections::HashMap<i64, std::collections::HashMap<usize, usize>> =
        std::collections::HashMap::new();
    let (h, w) = labels.dim();
    for y in 0..h {
        for x in 0..w {
            let lbl = labels[(y, x)];
            if lbl <= 0 {
                continue;
            }
            if let Some(col) = column_bounds
                .iter()
                .position(|&(x0, x1)| x >= x0 && x < x1)
            {
                *per_label_cols.entry(lbl).or_default().entry(col).or_insert(0) += 1;
            }
        }
    }
    per_label_cols
        .into_iter()
        .filter(|(_, cols)| cols.values().filter(|&&n| n >= min_px).count() >= 2)
        .map(|(lbl, _)| lbl)
        .collect()
}

/// `show_small_parts`: labels smaller than `n` pixels.
pub fn show_small_parts(binary: &Array2<u8>, labels: &Array2<i64>, n: usize) -> HashSet<i64> {
    let mask = binary.mapv(|v| v != 0);
    let kept = remove_small_objects(&mask, n);
    let mut small: HashSet<i64> = HashSet::new();
    let (h, w) = mask.dim();
    for y in 0..h {
        for x in 0..w {
            if mask[(y, x)] && !kept[(y, x)] {
                small.insert(labels[(y, x)]);
            }
        }
    }
    small
}

/// `show_parts_at_column_ends`: labels touching the rightmost `npixels`
/// of a column, where the column's rightmost foreground pixel in that row
/// is within `npixels` of the column end.
pub fn show_parts_at_column_ends(
    binary: &Array2<u8>,
    labels: &Array2<i64>,
    column_bounds: &[(usize, usize)],
    npixels: u32,
) -> HashSet<i64> {
    let (h, _w) = binary.dim();
    let mut result = HashSet::new();
    for &(x0, x1) in column_bounds {
        for y in 0..h {
            let mut rightmost = None;
            for x in x0..x1 {
                if binary[(y, x)] != 0 {
                    rightmost = Some(x);
                }
            }
            if let Some(rx) = rightmost {
                if x1.saturating_sub(rx) <= npixels as usize {
                    let strip_start = x1.saturating_sub(npixels as usize).max(x0);
                    for x in strip_start..x1 {
                        if binary[(y, x)] != 0 {
                            result.insert(labels[(y, x)]);
                        }
                    }
                }
            }
        }
    }
    result
}

/// Apply a set of candidate labels against `labels`/`binary`, zeroing
/// them out. Returns the count of pixels cleared.
pub fn apply_label_removal(binary: &mut Array2<u8>, labels: &mut Array2<i64>, candidates: &HashSet<i64>) -> usize {
    let mut cleared = 0;
    ndarray::Zip::from(binary).and(labels).for_each(|b, l| {
        if *l > 0 && candidates.contains(l) {
            *b = 0;
            *l = 0;
            cleared += 1;
        }
    });
    cleared
}

/// Linearly interpolate `values` at every row index in `removed_rows`
/// from the nearest surviving rows, extrapolating at the array boundary
/// by repeating the nearest surviving value. Operates in place.
pub fn interpolate_removed_rows(values: &mut [f64], removed_rows: &HashSet<usize>) {
    let n = values.len();
    if n == 0 {
        return;
    }
    let is_removed = |i: usize| removed_rows.contains(&i);
    let mut i = 0;
    while i < n {
        if !is_removed(i) {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && is_removed(i) {
            i += 1;
        }
        let end = i; // exclusive, first surviving row (or n)
        let before = if start > 0 { Some(values[start - 1]) } else { None };
        let after = if end < n { Some(values[end]) } else { None };
        match (before, after) {
            (Some(b), Some(a)) => {
                let span = (end - (start - 1)) as f64;
                for (k, row) in (start..end).enumerate() {
                    let t = (k as f64 + 1.0) / span;
                    values[row] = b + (a - b) * t;
                }
            }
            (Some(b), None) => {
                for row in start..end {
                    values[row] = b;
                }
            }
            (None, Some(a)) => {
                for row in start..end {
                    values[row] = a;
                }
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn detects_full_width_hline() {
        let mut bin = Array2::<u8>::zeros((10, 10));
        for x in 0..10 {
            bin[(5, x)] = 1;
        }
        let locs = recognize_hlines(&bin, 0.99, 1, None, None);
        assert_eq!(locs.0, vec![5]);
    }

    #[test]
    fn interpolates_removed_row_linearly() {
        let mut values = vec![0.0, 0.0, 99.0, 0.0, 10.0];
        let mut removed = HashSet::new();
        removed.insert(2);
        values[0] = 5.0;
        values[1] = 5.0;
        values[3] = 5.0;
        values[4] = 5.0;
        interpolate_removed_rows(&mut values, &removed);
        assert_eq!(values[2], 5.0);
    }

    #[test]
    fn boundary_extrapolation_repeats_nearest() {
        let mut values = vec![0.0, 7.0, 7.0];
        let mut removed = HashSet::new();
        removed.insert(0);
        interpolate_removed_rows(&mut values, &removed);
        assert_eq!(values[0], 7.0);
    }

    #[test]
    fn cross_column_feature_needs_two_columns() {
        let mut labels = Array2::<i64>::zeros((3, 10));
        for x in 0..10 {
            labels[(0, x)] = 1;
        }
        let bounds = vec![(0usize, 5usize), (5usize, 10usize)];
        let found = show_cross_column_features(&labels, &bounds, 3);
        assert!(found.contains(&1));
    }
}

//! C3 — column segmentation: estimate column starts/ends from binary density.

use ndarray::Array2;
use std::collections::BTreeSet;

/// Estimate column starts from a binary crop.
///
/// Candidates are the union of three detectors (null-gap, doubling,
/// increasing-run), then filtered to require at least `0.01 * W` pixels
/// between consecutive starts.
pub fn estimate_column_starts(binary: &Array2<u8>, threshold: f64) -> Vec<usize> {
    let (h, w) = binary.dim();
    if w == 0 {
        return vec![];
    }

    let mut col_mask = vec![false; w];
    let mut summed = vec![0u64; w];
    for x in 0..w {
        let mut any = false;
        let mut sum = 0u64;
        for y in 0..h {
            if binary[(y, x)] != 0 {
                any = true;
                sum += 1;
            }
        }
        col_mask[x] = any;
        summed[x] = sum;
    }
    let valid: Vec<bool> = summed
        .iter()
        .map(|&s| (s as f64) / (h.max(1) as f64) >= threshold)
        .collect();

    let mut candidates: BTreeSet<usize> = BTreeSet::new();

    // Null-gap: False -> True transitions.
    for x in 1..w {
        if !col_mask[x - 1] && col_mask[x] {
            candidates.insert(x);
        }
    }
    if w > 0 && col_mask[0] {
        candidates.insert(0);
    }

    // Doubling.
    for x in 1..w {
        if valid[x] && (summed[x] as f64) > 2.0 * (summed[x - 1] as f64) {
            candidates.insert(x);
        }
    }

    // Increasing runs: maximal runs where summed strictly increases.
    let mut x = 1;
    while x < w {
        if summed[x] > summed[x - 1] {
            let start = x - 1;
            let mut end = x;
            while end + 1 < w && summed[end + 1] > summed[end] {
                end += 1;
            }
            if valid[end] && (summed[end] as f64) > 2.0 * (summed[start] as f64) {
                candidates.insert(start + 1);
            }
            x = end + 1;
        } else {
            x += 1;
        }
    }

    let min_gap = ((w as f64) * 0.01).ceil() as usize;
    let mut starts: Vec<usize> = Vec::new();
    for c in candidates {
        if starts.last().map_or(true, |&last| c.saturating_sub(last) >= min_gap) {
            starts.push(c);
        }
    }
    starts
}

/// Compute default column ends from starts and the crop width:
/// `ends[i] = starts[i+1]`, last = `width`.
pub fn default_column_ends(starts: &[usize], width: usize) -> Vec<usize> {
    let mut ends = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        if i + 1 < starts.len() {
            ends.push(starts[i + 1]);
        } else {
            ends.push(width);
        }
    }
    ends
}

/// Validate the column geometry invariants from the data model:
/// `starts` strictly increasing; `ends[i] >= starts[i]`;
/// `ends[i] <= starts[i+1]` when both exist.
pub fn validate_geometry(starts: &[usize], ends: &[usize]) -> bool {
    if starts.len() != ends.len() {
        return false;
    }
    for i in 0..starts.len() {
        if ends[i] < starts[i] {
            return false;
        }
        if i > 0 && starts[i] <= starts[i - 1] {
            return false;
        }
        if i + 1 < starts.len() && ends[i] > starts[i + 1] {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn detects_null_gap_columns() {
        let mut bin = Array2::<u8>::zeros((20, 30));
        for y in 0..20 {
            for x in 5..10 {
                bin[(y, x)] = 1;
            }
            for x in 15..20 {
                bin[(y, x)] = 1;
            }
        }
        let starts = estimate_column_starts(&bin, 0.10);
        assert!(starts.contains(&5));
        assert!(starts.contains(&15));
    }

    #[test]
    fn default_ends_chain_starts() {
        let starts = vec![2, 10, 20];
        let ends = default_column_ends(&starts, 30);
        assert_eq!(ends, vec![10, 20, 30]);
        assert!(validate_geometry(&starts, &ends));
    }
}

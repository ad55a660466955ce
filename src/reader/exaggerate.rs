//! C7 — exaggeration merge: overlay an exaggerated reader's digitization
//! wherever the base value falls at or below a per-column threshold.

use ndarray::Array2;

/// For every cell in `columns` where `base <= max(fraction * width, absolute)`,
/// replace it with `exaggerated / factor`. Returns the merged frame and a
/// boolean mask of which cells were replaced.
pub fn digitize_exaggerated(
    base: &Array2<f64>,
    exaggerated: &Array2<f64>,
    columns: &[usize],
    column_widths: &[usize],
    factor: f64,
    fraction: f64,
    absolute: f64,
) -> (Array2<f64>, Array2<bool>) {
    let mut merged = base.clone();
    let mut replaced = Array2::<bool>::from_elem(base.dim(), false);
    let h = base.nrows();
    for (ci, &col) in columns.iter().enumerate() {
        let w = column_widths[ci] as f64;
        let threshold = (fraction * w).max(absolute);
        for y in 0..h {
            let b = base[(y, col)];
            if !b.is_nan() && b <= threshold {
                merged[(y, col)] = exaggerated[(y, col)] / factor;
                replaced[(y, col)] = true;
            }
        }
    }
    (merged, replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn replaces_only_below_threshold_cells() {
        let base = array![[1.0, 10.0], [20.0, 30.0]];
        let exaggerated = array![[4.0, 40.0], [80.0, 120.0]];
        let (merged, replaced) = digitize_exaggerated(&base, &exaggerated, &[0], &[100], 4.0, 0.05, 2.0);
        // threshold = max(0.05*100, 2.0) = 5.0
        assert!(replaced[(0, 0)]); // base 1.0 <= 5.0
        assert_eq!(merged[(0, 0)], 1.0); // 4.0 / 4.0
        assert!(!replaced[(1, 0)]); // base 20.0 > 5.0
        assert_eq!(merged[(1, 0)], 20.0);
        assert!(!replaced[(0, 1)]); // column not in the exaggerated set
    }
}

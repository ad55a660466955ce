//! C10 — occurrences: a sparse marker set for "taxon present, value
//! unreadable". One `HashSet<(x_crop, y_crop)>` per reader.

use crate::labeling::{label, Selection};

/// Consume the current selection: for each currently-selected connected
/// component (defined by the selection's own labeling, not the reader's
/// original labels — a user may have drawn an ad-hoc mark), compute its
/// centroid rounded to the nearest crop-local pixel.
pub fn centroids_of_selected(selection: &Selection) -> Vec<(i64, i64)> {
    let mask = selection.selected_mask();
    let (labels, num_labels) = label(&mask.mapv(|v| v as u8));
    if num_labels == 0 {
        return vec![];
    }
    let mut sum_x = vec![0i64; (num_labels + 1) as usize];
    let mut sum_y = vec![0i64; (num_labels + 1) as usize];
    let mut count = vec![0i64; (num_labels + 1) as usize];
    let (h, w) = labels.dim();
    for y in 0..h {
        for x in 0..w {
            let l = labels[(y, x)];
            if l > 0 {
                sum_x[l as usize] += x as i64;
                sum_y[l as usize] += y as i64;
                count[l as usize] += 1;
            }
        }
    }
    (1..=num_labels)
        .filter(|&l| count[l as usize] > 0)
        .map(|l| {
            let l = l as usize;
            let cx = (sum_x[l] as f64 / count[l] as f64).round() as i64;
            let cy = (sum_y[l] as f64 / count[l] as f64).round() as i64;
            (cx, cy)
        })
        .collect()
}

/// Locate the column owning a crop-local x coordinate.
pub fn assign_column(x_crop: i64, column_bounds: &[(usize, usize)]) -> Option<usize> {
    if x_crop < 0 {
        return None;
    }
    column_bounds
        .iter()
        .position(|&(x0, x1)| x_crop >= x0 as i64 && x_crop < x1 as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn centroid_of_a_single_blob() {
        let bin = array![[0, 0, 0], [0, 1, 1], [0, 1, 1]];
        let mut sel = Selection::from_labeling(&bin);
        sel.select_all();
        let centroids = centroids_of_selected(&sel);
        assert_eq!(centroids, vec![(1, 1)]);
    }

    #[test]
    fn assigns_column_by_bounds() {
        let bounds = vec![(0usize, 5usize), (5usize, 10usize)];
        assert_eq!(assign_column(3, &bounds), Some(0));
        assert_eq!(assign_column(7, &bounds), Some(1));
        assert_eq!(assign_column(-1, &bounds), None);
        assert_eq!(assign_column(20, &bounds), None);
    }
}

//! C8 — sample (measurement) finder: per-column extremum detection with
//! obstacle rejection, cross-column bar/overlap grouping, and merging of
//! close samples.

use std::collections::{HashMap, HashSet};

use ndarray::Array2;

/// A half-open row interval `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: usize,
    pub hi: usize,
}

impl Interval {
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }
    pub fn center(&self) -> f64 {
        (self.lo + self.hi) as f64 / 2.0
    }
}

fn sign(d: f64) -> i32 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

/// First pass over a column's raw value array: emit a candidate interval
/// at every local-extremum slope-sign change, plus at every crossing from
/// positive to non-positive (treated as a minimum). A quick return back
/// above zero (within `merge_gap` rows) merges with the previous minimum
/// rather than opening a fresh interval.
fn raw_extrema(a: &[f64], merge_gap: i64) -> Vec<Interval> {
    let n = a.len();
    if n < 2 {
        return vec![];
    }
    let mut out: Vec<Interval> = Vec::new();
    let mut last_sign = 0i32;
    let mut last_change_row = 0usize;
    let mut zero_open = false;

    for i in 0..n - 1 {
        let d = a[i + 1] - a[i];
        let s = sign(d);

        if a[i] > 0.0 && a[i + 1] <= 0.0 {
            if zero_open {
                if let Some(prev) = out.last_mut() {
                    prev.hi = (i + 1).max(prev.hi);
                }
            } else if let Some(prev) = out.last_mut().filter(|p| (i as i64 - p.hi as i64) <= merge_gap) {
                prev.hi = i + 1;
            } else {
                out.push(Interval { lo: i, hi: i + 1 });
            }
            zero_open = true;
        } else if a[i] <= 0.0 && a[i + 1] > 0.0 {
            zero_open = false;
        }

        if s != 0 {
            if last_sign != 0 && s != last_sign {
                out.push(Interval {
                    lo: last_change_row,
                    hi: i + 1,
                });
            }
            last_sign = s;
            last_change_row = i + 1;
        }
    }
    out
}

/// Merge candidate intervals that sit right next to each other (gap
/// `<= gap_tol`) when both are themselves short (`<= max_component_len`)
/// into a single span. A short down-then-up (or up-then-down) pair of
/// candidates like this is the signature of a pin-hole bump: the two
/// separate slope-sign-change events it produces should be judged as one
/// obstacle, not two genuine extrema.
fn merge_adjacent(intervals: &[Interval], gap_tol: i64, max_component_len: i64) -> Vec<Interval> {
    if intervals.is_empty() {
        return vec![];
    }
    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|iv| iv.lo);
    let mut out: Vec<Interval> = vec![sorted[0]];
    for iv in &sorted[1..] {
        let prev = *out.last().unwrap();
        let prev_short = prev.len() as i64 <= max_component_len;
        let cur_short = iv.len() as i64 <= max_component_len;
        let gap = iv.lo as i64 - prev.hi as i64;
        if gap <= gap_tol && prev_short && cur_short {
            out.last_mut().unwrap().hi = prev.hi.max(iv.hi);
        } else {
            out.push(*iv);
        }
    }
    out
}

/// An interval is an obstacle — a bump interrupting a monotone trend —
/// if the local slopes immediately to its left and right (taken just
/// outside the interval) share the same sign: the value dips or bumps
/// and then keeps going the way it was already going.
fn is_obstacle(a: &[f64], iv: &Interval) -> bool {
    if iv.lo == 0 || iv.hi >= a.len() {
        return false;
    }
    let left_slope = a[iv.lo] - a[iv.lo - 1];
    let right_slope = a[iv.hi] - a[iv.hi - 1];
    let ls = sign(left_slope);
    let rs = sign(right_slope);
    ls != 0 && ls == rs
}

fn flatten(a: &mut [f64], iv: &Interval) {
    let left = if iv.lo > 0 { a[iv.lo - 1] } else { a[iv.lo] };
    let right = if iv.hi < a.len() { a[iv.hi] } else { a[iv.hi.saturating_sub(1)] };
    let v = left.min(right);
    for x in a.iter_mut().take(iv.hi).skip(iv.lo) {
        *x = v;
    }
}

/// Find candidate extremum intervals for one column's value array,
/// filtered by `min_len`/`max_len` and a caller-supplied predicate, with
/// obstacle rejection: rejected intervals are flattened in a working
/// copy and a second pass picks up any extrema the flattening exposed.
/// Returns `(included, excluded)`.
pub fn find_potential_samples(
    a: &[f64],
    min_len: usize,
    max_len: usize,
    merge_gap: i64,
    obstacle_max_width: i64,
    filter_func: impl Fn(&Interval) -> bool,
) -> (Vec<Interval>, Vec<Interval>) {
    let first = merge_adjacent(&raw_extrema(a, merge_gap), obstacle_max_width, obstacle_max_width);
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut flattened = a.to_vec();
    let mut any_flattened = false;

    let passes_len = |iv: &Interval| {
        let len = iv.len().max(1);
        len >= min_len && len <= max_len
    };

    for iv in &first {
        if !passes_len(iv) || !filter_func(iv) {
            continue;
        }
        if is_obstacle(a, iv) {
            log::debug!("sample finder: rejecting obstacle interval [{}, {}) as a monotone-trend bump", iv.lo, iv.hi);
            excluded.push(*iv);
            flatten(&mut flattened, iv);
            any_flattened = true;
        } else {
            included.push(*iv);
        }
    }

    if any_flattened {
        let second = merge_adjacent(&raw_extrema(&flattened, merge_gap), obstacle_max_width, obstacle_max_width);
        for iv in second {
            if !passes_len(&iv) || !filter_func(&iv) {
                continue;
            }
            if !included.contains(&iv) {
                included.push(iv);
            }
        }
    }

    (included, excluded)
}

/// One candidate extremum tagged by its owning column, ready for
/// cross-column grouping.
#[derive(Debug, Clone, Copy)]
pub struct ColBar {
    pub col: usize,
    pub interval: Interval,
}

/// Recover one interval per already-segmented bar directly from a bar
/// reader's `full_df` column: `fill_bar_values` writes a constant value
/// across each bar's `[lo, hi)` span and `NAN` in the gaps between bars,
/// so every maximal run of non-NaN rows is exactly one bar. Used instead
/// of `find_potential_samples`, whose sign-change detector never fires
/// across a NaN gap.
pub fn bar_intervals(column: &[f64]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < column.len() {
        if column[i].is_nan() {
            i += 1;
            continue;
        }
        let lo = i;
        while i < column.len() && !column[i].is_nan() {
            i += 1;
        }
        out.push(Interval { lo, hi: i });
    }
    out
}

fn overlaps(b1: &ColBar, b2: &ColBar, min_fract: f64) -> bool {
    if b1.col == b2.col {
        return false;
    }
    let lo = b1.interval.lo.max(b2.interval.lo);
    let hi = b1.interval.hi.min(b2.interval.hi);
    if hi <= lo {
        return false;
    }
    let overlap = (hi - lo) as f64;
    let min_len = b1.interval.len().min(b2.interval.len());
    let threshold = ((min_len as f64 - 1.0).min(min_fract * min_len as f64)).max(0.0);
    overlap >= threshold
}

struct UnionFind {
    parent: Vec<usize>,
}
impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n).collect() }
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

/// Group overlapping bars across columns into maximal connected groups.
/// A bar that overlaps nothing (e.g. the sole column of a single-column
/// bar diagram) still forms its own one-member group rather than being
/// discarded. When several bars from the same column land in one group
/// (ambiguous overlap), keep only the one closest to the group's mean
/// center, discarding the rest (a non-fatal consistency warning at the
/// caller).
pub fn unique_bars(bars: &[ColBar], min_fract: f64) -> Vec<Vec<usize>> {
    let n = bars.len();
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in i + 1..n {
            if overlaps(&bars[i], &bars[j], min_fract) {
                uf.union(i, j);
            }
        }
    }
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut result = Vec::new();
    for (_, mut members) in groups {
        let mut by_col: HashMap<usize, Vec<usize>> = HashMap::new();
        for &idx in &members {
            by_col.entry(bars[idx].col).or_default().push(idx);
        }
        if by_col.values().any(|v| v.len() > 1) {
            let mean_center: f64 =
                members.iter().map(|&i| bars[i].interval.center()).sum::<f64>() / members.len() as f64;
            members = by_col
                .into_iter()
                .map(|(_, idxs)| {
                    idxs.into_iter()
                        .min_by(|&a, &b| {
                            let da = (bars[a].interval.center() - mean_center).abs();
                            let db = (bars[b].interval.center() - mean_center).abs();
                            da.partial_cmp(&db).unwrap()
                        })
                        .unwrap()
                })
                .collect();
            members.sort_unstable();
        }
        result.push(members);
    }
    result.sort_by_key(|m| m[0]);
    result
}

/// Assemble one sample row per group: the row is `round(mean of member
/// interval centers)`; member columns take the average of `full_df` over
/// their own interval (rounded); non-member columns take the value at the
/// group's sample row. `rough_locs` records each member's interval, or
/// `(-1, -1)` for columns not part of the group.
pub fn find_measurements(
    groups: &[Vec<usize>],
    bars: &[ColBar],
    full_df: &Array2<f64>,
    n_cols: usize,
) -> (Vec<usize>, Array2<f64>, Array2<(i64, i64)>) {
    let mut rows = Vec::with_capacity(groups.len());
    let mut values = Array2::<f64>::zeros((groups.len(), n_cols));
    let mut rough = Array2::from_elem((groups.len(), n_cols), (-1i64, -1i64));

    for (gi, members) in groups.iter().enumerate() {
        let mean: f64 = members.iter().map(|&i| bars[i].interval.center()).sum::<f64>() / members.len() as f64;
        let row = mean.round() as usize;
        rows.push(row);

        let mut member_cols = HashSet::new();
        for &idx in members {
            let b = &bars[idx];
            member_cols.insert(b.col);
            let (lo, hi) = (b.interval.lo, b.interval.hi);
            let mut sum = 0.0;
            let mut count = 0usize;
            for r in lo..hi.min(full_df.nrows()) {
                let v = full_df[(r, b.col)];
                if !v.is_nan() {
                    sum += v;
                    count += 1;
                }
            }
            values[(gi, b.col)] = if count > 0 { (sum / count as f64).round() } else { 0.0 };
            rough[(gi, b.col)] = (lo as i64, hi as i64);
        }
        for col in 0..n_cols {
            if !member_cols.contains(&col) {
                let v = full_df.get((row, col)).copied().unwrap_or(0.0);
                values[(gi, col)] = if v.is_nan() { 0.0 } else { v };
            }
        }
    }
    (rows, values, rough)
}

/// Ensure the first and last non-null rows of `full_df` are present as
/// samples (the boundary policy applied for non-bar readers).
pub fn boundary_rows(full_df: &Array2<f64>) -> Option<(usize, usize)> {
    let h = full_df.nrows();
    let mut first = None;
    let mut last = None;
    for y in 0..h {
        let has_value = (0..full_df.ncols()).any(|c| {
            let v = full_df[(y, c)];
            !v.is_nan() && v != 0.0
        });
        if has_value {
            first.get_or_insert(y);
            last = Some(y);
        }
    }
    match (first, last) {
        (Some(f), Some(l)) => Some((f, l)),
        _ => None,
    }
}

/// Merge consecutive samples whose rows are within `pixel_tol` of each
/// other. The merged row is the mean of whichever members have the
/// narrowest rough interval (smallest `hi - lo` across all their
/// columns); per-column values are re-read from `full_df` at that row;
/// rough intervals widen to `[min_lo, max_hi]`. `warn` is invoked once
/// per column where distinct intervals were merged.
pub fn merge_close_measurements(
    rows: &[usize],
    values: &Array2<f64>,
    rough: &Array2<(i64, i64)>,
    full_df: &Array2<f64>,
    pixel_tol: i64,
    mut warn: impl FnMut(String),
) -> (Vec<usize>, Array2<f64>, Array2<(i64, i64)>) {
    let n_cols = values.ncols();
    let n = rows.len();
    if n == 0 {
        return (vec![], Array2::zeros((0, n_cols)), Array2::from_elem((0, n_cols), (-1, -1)));
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut cur = vec![0usize];
    for i in 1..n {
        let prev = *cur.last().unwrap();
        if (rows[i] as i64 - rows[prev] as i64).abs() <= pixel_tol {
            cur.push(i);
        } else {
            groups.push(std::mem::replace(&mut cur, vec![i]));
        }
    }
    groups.push(cur);

    let mut new_rows = Vec::with_capacity(groups.len());
    let mut new_values = Array2::<f64>::zeros((groups.len(), n_cols));
    let mut new_rough = Array2::from_elem((groups.len(), n_cols), (-1i64, -1i64));

    for (gi, members) in groups.iter().enumerate() {
        if members.len() == 1 {
            let i = members[0];
            new_rows.push(rows[i]);
            for c in 0..n_cols {
                new_values[(gi, c)] = values[(i, c)];
                new_rough[(gi, c)] = rough[(i, c)];
            }
            continue;
        }

        let width_of = |i: usize| -> i64 {
            (0..n_cols)
                .filter_map(|c| {
                    let (lo, hi) = rough[(i, c)];
                    if lo < 0 {
                        None
                    } else {
                        Some(hi - lo)
                    }
                })
                .min()
                .unwrap_or(i64::MAX)
        };
        let min_width = members.iter().map(|&i| width_of(i)).min().unwrap();
        let narrowest: Vec<usize> = members.iter().copied().filter(|&i| width_of(i) == min_width).collect();
        let new_row = (narrowest.iter().map(|&i| rows[i] as f64).sum::<f64>() / narrowest.len() as f64).round() as usize;
        new_rows.push(new_row);

        for c in 0..n_cols {
            let v = full_df.get((new_row, c)).copied().unwrap_or(0.0);
            new_values[(gi, c)] = if v.is_nan() { 0.0 } else { v };

            let mut min_lo = i64::MAX;
            let mut max_hi = i64::MIN;
            let mut distinct: HashSet<(i64, i64)> = HashSet::new();
            for &i in members {
                let (lo, hi) = rough[(i, c)];
                if lo >= 0 {
                    min_lo = min_lo.min(lo);
                    max_hi = max_hi.max(hi);
                    distinct.insert((lo, hi));
                }
            }
            if min_lo <= max_hi {
                new_rough[(gi, c)] = (min_lo, max_hi);
                if distinct.len() > 1 {
                    warn(format!(
                        "merge_close_measurements: merged distinct rough intervals in column {c} at row {new_row}"
                    ));
                }
            }
        }
    }
    (new_rows, new_values, new_rough)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn obstacle_bump_on_monotone_rise_is_rejected() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let (included, excluded) = find_potential_samples(&a, 1, 100, 4, 2, |_| true);
        assert!(!excluded.is_empty(), "the pin-hole bump must be flagged as an obstacle");
        for iv in &included {
            assert!(
                !(iv.lo <= 6 && iv.hi >= 5),
                "no extremum should survive around the index 5-6 bump, got {iv:?}"
            );
        }
    }

    #[test]
    fn cross_column_bars_form_one_group() {
        let bars = vec![
            ColBar { col: 0, interval: Interval { lo: 10, hi: 14 } },
            ColBar { col: 1, interval: Interval { lo: 11, hi: 15 } },
            ColBar { col: 2, interval: Interval { lo: 12, hi: 16 } },
        ];
        let groups = unique_bars(&bars, 0.9);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);

        let full_df = Array2::<f64>::zeros((20, 3));
        let (rows, _values, rough) = find_measurements(&groups, &bars, &full_df, 3);
        assert_eq!(rows.len(), 1);
        assert!((rows[0] as i64 - 13).abs() <= 1);
        assert_eq!(rough[(0, 0)], (10, 14));
        assert_eq!(rough[(0, 1)], (11, 15));
        assert_eq!(rough[(0, 2)], (12, 16));
    }

    #[test]
    fn merge_close_measurements_collapses_adjacent_rows() {
        let rows = vec![10usize, 11, 30];
        let values = array![[1.0], [1.0], [5.0]];
        let rough = array![[(10i64, 11i64)], [(11, 12)], [(29, 31)]];
        let full_df = Array2::<f64>::from_elem((40, 1), 1.0);
        let mut warned = vec![];
        let (new_rows, _new_values, _new_rough) =
            merge_close_measurements(&rows, &values, &rough, &full_df, 2, |w| warned.push(w));
        assert_eq!(new_rows.len(), 2);
        assert_eq!(new_rows[1], 30);
    }

    #[test]
    fn bar_intervals_recovers_runs_between_nan_gaps() {
        let column = vec![f64::NAN, 3.0, 3.0, 3.0, f64::NAN, f64::NAN, 5.0, 5.0, f64::NAN];
        let ivs = bar_intervals(&column);
        assert_eq!(ivs, vec![Interval { lo: 1, hi: 4 }, Interval { lo: 6, hi: 8 }]);
    }

    #[test]
    fn obstacle_rejection_with_trivial_bar_scenario() {
        // column with bars at [2,5), [9,12), [16,20) of heights 3,5,2 —
        // each should be found independently as a potential sample.
        let mut a = vec![0.0; 24];
        for i in 2..5 {
            a[i] = 3.0;
        }
        for i in 9..12 {
            a[i] = 5.0;
        }
        for i in 16..20 {
            a[i] = 2.0;
        }
        let (included, _excluded) = find_potential_samples(&a, 1, 100, 4, 2, |_| true);
        assert!(!included.is_empty());
    }
}

//! C6 — digitizers. `digitize()` turns a reader's binary crop into one
//! `full_df` column per owned column: the horizontal pixel offset of the
//! curve from the column start, at every row.

use std::collections::HashSet;

use ndarray::Array2;

use crate::cleaners::interpolate_removed_rows;

/// Area reader (and the identical line reader): per row, either the
/// count of foreground pixels in the column's box (`use_sum`) or
/// `1 + index of the rightmost foreground pixel` relative to the column
/// start (0 if the row has no foreground) — the right edge of a filled
/// area curve.
pub fn digitize_area(binary: &Array2<u8>, col_bounds: (usize, usize), use_sum: bool) -> Vec<f64> {
    let (h, _w) = binary.dim();
    let (x0, x1) = col_bounds;
    let mut out = vec![0.0; h];
    for y in 0..h {
        if use_sum {
            let mut count = 0u32;
            for x in x0..x1 {
                if binary[(y, x)] != 0 {
                    count += 1;
                }
            }
            out[y] = count as f64;
        } else {
            let mut rightmost: Option<usize> = None;
            for x in x0..x1 {
                if binary[(y, x)] != 0 {
                    rightmost = Some(x);
                }
            }
            out[y] = match rightmost {
                Some(rx) => (rx - x0 + 1) as f64,
                None => 0.0,
            };
        }
    }
    out
}

/// Interpolate any row present in `hline_locs` from its surviving
/// neighbours, per column. Must run after the raster pass and before bar
/// segmentation.
pub fn apply_hline_interpolation(values: &mut [f64], hline_locs: &HashSet<usize>) {
    interpolate_removed_rows(values, hline_locs);
}

/// A segmented bar: row interval `[lo, hi)` and its representative value
/// (the bar's max raw value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub lo: usize,
    pub hi: usize,
    pub value: f64,
}

impl Bar {
    pub fn len(&self) -> usize {
        self.hi - self.lo
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

/// Walk the raw per-row values with the bar state machine: `Empty` until
/// the first non-zero row opens `Open(start, start_val)`; a bar closes
/// (emitting `[start, i+1)`) on a return to zero/NaN, on `|value -
/// start_val| > tolerance`, on a local slope reversal not flagged as an
/// obstacle (rounded bars only), or at the end of the column.
pub fn segment_bars(values: &[f64], tolerance: i64, rounded: bool) -> Vec<Bar> {
    let n = values.len();
    let mut bars = Vec::new();
    let mut state: Option<(usize, f64)> = None;
    let mut last_val: Option<f64> = None;
    let mut last_delta_sign = 0i32;

    let is_gap = |v: f64| v == 0.0 || v.is_nan();

    for i in 0..n {
        let v = values[i];
        match state {
            None => {
                if !is_gap(v) {
                    state = Some((i, v));
                    last_val = Some(v);
                    last_delta_sign = 0;
                }
            }
            Some((start, start_val)) => {
                if is_gap(v) {
                    bars.push(emit(values, start, i));
                    state = None;
                    last_val = None;
                    continue;
                }
                let breach = (v - start_val).abs() > tolerance as f64;
                let mut reversal = false;
                if rounded {
                    if let Some(lv) = last_val {
                        let cur_sign = sign(v - lv);
                        if last_delta_sign != 0 && cur_sign != 0 && cur_sign != last_delta_sign {
                            reversal = true;
                        }
                        if cur_sign != 0 {
                            last_delta_sign = cur_sign;
                        }
                    }
                }
                if breach || reversal {
                    bars.push(emit(values, start, i));
                    state = Some((i, v));
                    last_delta_sign = 0;
                }
                last_val = Some(v);
            }
        }
    }
    if let Some((start, _)) = state {
        bars.push(emit(values, start, n));
    }
    bars
}

fn emit(values: &[f64], lo: usize, hi: usize) -> Bar {
    let value = values[lo..hi].iter().cloned().fold(f64::MIN, f64::max);
    Bar { lo, hi, value }
}

fn median_len(bars: &[Bar]) -> usize {
    let mut lens: Vec<usize> = bars.iter().map(Bar::len).collect();
    if lens.is_empty() {
        return 0;
    }
    lens.sort_unstable();
    lens[lens.len() / 2]
}

pub struct BarSegmentation {
    pub bars: Vec<Bar>,
    pub too_long: Vec<Bar>,
    pub split_candidates: Vec<Vec<Bar>>,
}

/// Drop bars shorter than `min_len` (default `0.4 * median`), then flag
/// bars longer than `max_len` (default `1.7 * median`) as "too long" and
/// propose equal-width splits into `ceil(len / median)` sub-bars, stored
/// separately for user review rather than applied automatically.
pub fn filter_and_split_bars(
    bars: Vec<Bar>,
    min_len: Option<usize>,
    max_len: Option<usize>,
) -> BarSegmentation {
    let median = median_len(&bars).max(1);
    let min_len = min_len.unwrap_or_else(|| (0.4 * median as f64).round() as usize);
    let max_len = max_len.unwrap_or_else(|| (1.7 * median as f64).round() as usize);

    let kept: Vec<Bar> = bars.into_iter().filter(|b| b.len() >= min_len).collect();
    let mut final_bars = Vec::new();
    let mut too_long = Vec::new();
    let mut split_candidates = Vec::new();

    for b in kept {
        if b.len() > max_len {
            too_long.push(b);
            let n_sub = ((b.len() as f64) / median as f64).ceil().max(1.0) as usize;
            let sub_len = (b.len() / n_sub).max(1);
            let mut subs = Vec::new();
            let mut lo = b.lo;
            for k in 0..n_sub {
                let hi = if k + 1 == n_sub { b.hi } else { (lo + sub_len).min(b.hi) };
                subs.push(Bar { lo, hi, value: b.value });
                lo = hi;
            }
            split_candidates.push(subs);
        }
        final_bars.push(b);
    }
    BarSegmentation {
        bars: final_bars,
        too_long,
        split_candidates,
    }
}

/// Replace per-row values within each bar by the bar's representative
/// value; rows between bars become NaN ("between bars", never a silent
/// zero — see the numeric-edge-case policy).
pub fn fill_bar_values(n: usize, bars: &[Bar]) -> Vec<f64> {
    let mut out = vec![f64::NAN; n];
    for b in bars {
        for i in b.lo..b.hi {
            out[i] = b.value;
        }
    }
    out
}

/// Stacked-area reader: the rightmost foreground pixel per row for one
/// band, converted to a per-band *width* (this band's rightmost pixel
/// minus the cumulative width of all bands stacked beneath it at that
/// row). The column's plotted curve for band k is the prefix sum of
/// bands `0..=k`; `full_df` stores the widths, not the cumulative curve.
pub fn stacked_band_widths(
    band_rightmost: &[Option<usize>],
    col_start: usize,
    prev_cumulative: &[f64],
) -> Vec<f64> {
    band_rightmost
        .iter()
        .zip(prev_cumulative.iter())
        .map(|(r, &prev)| match r {
            Some(rx) => (((*rx as f64) - col_start as f64 + 1.0) - prev).max(0.0),
            None => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn area_reader_traces_right_edge() {
        let mut bin = Array2::<u8>::zeros((20, 20));
        for y in 5..15 {
            for x in 10..16 {
                bin[(y, x)] = 1;
            }
        }
        let values = digitize_area(&bin, (10, 20), false);
        for y in 5..15 {
            assert_eq!(values[y], 6.0);
        }
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn bar_segmentation_finds_three_bars() {
        let mut values = vec![0.0; 24];
        for i in 2..5 {
            values[i] = 3.0;
        }
        for i in 9..12 {
            values[i] = 5.0;
        }
        for i in 16..20 {
            values[i] = 2.0;
        }
        let bars = segment_bars(&values, 2, false);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0], Bar { lo: 2, hi: 5, value: 3.0 });
        assert_eq!(bars[1], Bar { lo: 9, hi: 12, value: 5.0 });
        assert_eq!(bars[2], Bar { lo: 16, hi: 20, value: 2.0 });
    }

    #[test]
    fn too_long_bars_get_split_candidates() {
        let bars = vec![
            Bar { lo: 0, hi: 3, value: 1.0 },
            Bar { lo: 5, hi: 8, value: 1.0 },
            Bar { lo: 10, hi: 24, value: 1.0 },
        ];
        let seg = filter_and_split_bars(bars, Some(1), Some(5));
        assert_eq!(seg.too_long.len(), 1);
        assert!(!seg.split_candidates.is_empty());
    }

    #[test]
    fn filled_bars_leave_gaps_as_nan() {
        let bars = vec![Bar { lo: 1, hi: 3, value: 4.0 }];
        let values = fill_bar_values(5, &bars);
        assert!(values[0].is_nan());
        assert_eq!(values[1], 4.0);
        assert_eq!(values[2], 4.0);
        assert!(values[3].is_nan());
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Every tunable threshold used by the pipeline, with the defaults
/// documented in the component design. Nothing in the core is hard-coded
/// to a single dataset; callers may override any of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// `to_greyscale`/`to_binary`: sum of RGB channels above which a pixel
    /// is treated as background (0..765).
    pub greyscale_threshold: u32,
    /// `estimate_column_starts`: minimum fraction of rows that must be
    /// foreground for a column to be "valid".
    pub column_density_threshold: f64,
    /// `recognize_hlines`/`recognize_vlines`: fraction of the
    /// perpendicular dimension that must be foreground for a line.
    pub line_fraction: f64,
    /// Minimum/maximum run length (in rows/columns) for a detected line.
    pub line_min_lw: u32,
    pub line_max_lw: Option<u32>,
    /// `show_disconnected_parts`: gap-from-previous-pixel and
    /// distance-from-column-start thresholds.
    pub disconnected_fromlast: u32,
    pub disconnected_from0: u32,
    /// `show_cross_column_features`: minimum pixel count per column.
    pub cross_column_min_px: usize,
    /// `show_small_parts`/`highlight_small`: component-size cutoff.
    pub small_parts_n: usize,
    /// `show_parts_at_column_ends`: width of the end-of-column strip.
    pub column_end_npixels: u32,
    /// Bar segmentation tolerance (rectangular / rounded).
    pub bar_tolerance: i64,
    pub rounded_bar_tolerance: i64,
    /// Bar length filter multipliers (applied to the median bar length
    /// when an explicit `min_len`/`max_len` isn't given).
    pub bar_min_len_fraction: f64,
    pub bar_max_len_fraction: f64,
    /// Sample finder: max row gap for merging a return-to-zero with the
    /// previous minimum, and obstacle interval length cutoff.
    pub sample_merge_gap: i64,
    pub obstacle_max_width: i64,
    /// Cross-column alignment: fraction of the shorter interval that two
    /// bars must overlap to be considered the same measurement.
    pub min_fract: f64,
    /// `merge_close_measurements`: row-distance tolerance.
    pub pixel_tol: i64,
    /// `digitize_exaggerated`: default fraction/absolute thresholds.
    pub exaggeration_fraction: f64,
    pub exaggeration_absolute: f64,
    /// Sentinel value written for occurrences on export.
    pub occurrences_value: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            greyscale_threshold: 690,
            column_density_threshold: 0.10,
            line_fraction: 0.99,
            line_min_lw: 2,
            line_max_lw: None,
            disconnected_fromlast: 5,
            disconnected_from0: 10,
            cross_column_min_px: 50,
            small_parts_n: 10,
            column_end_npixels: 2,
            bar_tolerance: 2,
            rounded_bar_tolerance: 10,
            bar_min_len_fraction: 0.4,
            bar_max_len_fraction: 1.7,
            sample_merge_gap: 4,
            obstacle_max_width: 2,
            min_fract: 0.9,
            pixel_tol: 2,
            exaggeration_fraction: 0.05,
            exaggeration_absolute: 8.0,
            occurrences_value: -9999.0,
        }
    }
}

/// Load thresholds from a JSON file, falling back to documented defaults
/// for any field absent in the file.
pub fn load_thresholds(path: impl AsRef<Path>) -> Result<Thresholds> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Save thresholds to a JSON file, creating parent directories as needed.
pub fn save_thresholds(path: impl AsRef<Path>, thresholds: &Thresholds) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(thresholds)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let t = Thresholds::default();
        assert_eq!(t.greyscale_threshold, 690);
        assert_eq!(t.occurrences_value, -9999.0);
        assert_eq!(t.bar_tolerance, 2);
        assert_eq!(t.rounded_bar_tolerance, 10);
    }

    #[test]
    fn round_trip_via_json() {
        let t = Thresholds {
            greyscale_threshold: 700,
            ..Thresholds::default()
        };
        let s = serde_json::to_string(&t).unwrap();
        let back: Thresholds = serde_json::from_str(&s).unwrap();
        assert_eq!(t, back);
    }
}

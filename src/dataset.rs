//! C12 — dataset serialization. A pure function of straditizer state: a
//! self-describing bundle of named arrays, round-tripping the full
//! reader tree, digitized data, samples, and axis translations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::axes::AxisMapping;
use crate::error::{Result, StraditizeError};
use crate::image_ops::Extent;
use crate::reader::{BarState, Reader, ReaderKind, StackedState};
use crate::straditizer::Straditizer;

/// One reader's persisted state. Dimension names mirror §4.12's table:
/// `reader_image`/`binary` are per-reader 2-D/3-D arrays, `col_map`
/// elsewhere records which reader owns each column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderRecord {
    pub reader_cls: ReaderKind,
    pub parent: usize,
    pub columns: Vec<usize>,
    pub is_exaggerated: f64,
    pub extent: Extent,
    pub image_w: u32,
    pub image_h: u32,
    pub image_rgba: Vec<u8>,
    pub binary: Vec<u8>,
    pub binary_shape: (usize, usize),
    pub xaxis_translation: Option<AxisMapping>,
    pub occurrences: Vec<(i64, i64)>,
    pub bar_tolerance: Option<i64>,
    pub bar_min_len: Option<usize>,
    pub bar_max_len: Option<usize>,
    pub bars: Vec<(usize, usize, f64)>,
    pub stacked_bands_added: Option<usize>,
    pub stacked_band_order: Vec<usize>,
}

/// The full self-describing dataset. Every field here corresponds to a
/// named variable/dimension in §4.12's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub image_w: u32,
    pub image_h: u32,
    pub image_rgba: Vec<u8>,
    pub data_xlim: Option<(u32, u32)>,
    pub data_ylim: Option<(u32, u32)>,
    pub yaxis_translation: Option<AxisMapping>,
    pub readers: Vec<ReaderRecord>,
    pub column_starts: Vec<usize>,
    pub column_ends: Vec<usize>,
    pub full_data: Option<Vec<f64>>,
    pub full_data_shape: Option<(usize, usize)>,
    pub hline: Vec<usize>,
    pub vline: Vec<usize>,
    pub shifted: Vec<i64>,
    pub measurement: Vec<usize>,
    pub measurements: Option<Vec<f64>>,
    pub measurements_shape: Option<(usize, usize)>,
    pub rough_locs: Option<Vec<(i64, i64)>>,
    pub rough_locs_shape: Option<(usize, usize)>,
    pub occurrences_value: f64,
    pub attrs: HashMap<String, String>,
    pub done_tasks: Vec<String>,
}

/// Serialize a straditizer's full state. Pure function of the state:
/// calling this twice without mutation yields byte-identical output.
pub fn to_dataset(s: &Straditizer) -> Dataset {
    let (iw, ih) = s.image.dimensions();
    let image_rgba = s.image.as_raw().clone();

    let readers = s
        .readers
        .iter()
        .map(|r| {
            let (rw, rh) = r.image.dimensions();
            let (bh, bw) = r.binary.dim();
            let bar_tolerance = r.bar_state.as_ref().map(|b| b.tolerance);
            let bar_min_len = r.bar_state.as_ref().and_then(|b| b.min_len);
            let bar_max_len = r.bar_state.as_ref().and_then(|b| b.max_len);
            let bars = r
                .bar_state
                .as_ref()
                .map(|b| b.bars.iter().map(|bar| (bar.lo, bar.hi, bar.value)).collect())
                .unwrap_or_default();
            let mut occ: Vec<(i64, i64)> = r.occurrences.iter().copied().collect();
            occ.sort_unstable();
            ReaderRecord {
                reader_cls: r.kind,
                parent: r.parent,
                columns: r.columns.clone(),
                is_exaggerated: r.is_exaggerated,
                extent: r.extent,
                image_w: rw,
                image_h: rh,
                image_rgba: r.image.as_raw().clone(),
                binary: r.binary.iter().copied().collect(),
                binary_shape: (bh, bw),
                xaxis_translation: r.xaxis,
                occurrences: occ,
                bar_tolerance,
                bar_min_len,
                bar_max_len,
                bars,
                stacked_bands_added: r.stacked_state.as_ref().map(|st| st.bands_added),
                stacked_band_order: r.stacked_state.as_ref().map(|st| st.band_order.clone()).unwrap_or_default(),
            }
        })
        .collect();

    let full_data_shape = s.full_df.as_ref().map(|df| df.dim());
    let full_data = s.full_df.as_ref().map(|df| df.iter().copied().collect());

    let measurements_shape = s.sample_values.as_ref().map(|v| v.dim());
    let measurements = s.sample_values.as_ref().map(|v| v.iter().copied().collect());
    let rough_locs_shape = s.rough_locs.as_ref().map(|v| v.dim());
    let rough_locs = s.rough_locs.as_ref().map(|v| v.iter().copied().collect());

    let mut hline: Vec<usize> = s.hline_locs.iter().copied().collect();
    hline.sort_unstable();
    let mut vline: Vec<usize> = s.vline_locs.iter().copied().collect();
    vline.sort_unstable();

    let mut done_tasks: Vec<String> = s.done_tasks.iter().cloned().collect();
    done_tasks.sort();

    Dataset {
        image_w: iw,
        image_h: ih,
        image_rgba,
        data_xlim: s.data_xlim,
        data_ylim: s.data_ylim,
        yaxis_translation: s.yaxis,
        readers,
        column_starts: s.column_starts.clone(),
        column_ends: s.column_ends.clone(),
        full_data,
        full_data_shape,
        hline,
        vline,
        shifted: s.shifts.clone(),
        measurement: s.sample_rows.clone().unwrap_or_default(),
        measurements,
        measurements_shape,
        rough_locs,
        rough_locs_shape,
        occurrences_value: s.thresholds.occurrences_value,
        attrs: s.attrs.clone(),
        done_tasks,
    }
}

/// Reconstruct a straditizer from a dataset. Reader ordering follows
/// §6: index 0 becomes the parent, 1..n are appended as children in
/// creation order.
pub fn from_dataset(ds: &Dataset) -> Result<Straditizer> {
    let image = image::RgbaImage::from_raw(ds.image_w, ds.image_h, ds.image_rgba.clone())
        .ok_or_else(|| StraditizeError::Dataset("malformed image buffer".into()))?;

    let mut s = Straditizer::new(image);
    s.data_xlim = ds.data_xlim;
    s.data_ylim = ds.data_ylim;
    s.yaxis = ds.yaxis_translation;
    s.column_starts = ds.column_starts.clone();
    s.column_ends = ds.column_ends.clone();
    s.hline_locs = ds.hline.iter().copied().collect();
    s.vline_locs = ds.vline.iter().copied().collect();
    s.shifts = ds.shifted.clone();
    s.attrs = ds.attrs.clone();
    s.done_tasks = ds.done_tasks.iter().cloned().collect();
    s.thresholds.occurrences_value = ds.occurrences_value;

    if let (Some(data), Some((h, w))) = (&ds.full_data, ds.full_data_shape) {
        s.full_df = Some(ndarray::Array2::from_shape_vec((h, w), data.clone())
            .map_err(|e| StraditizeError::Dataset(e.to_string()))?);
    }
    if let (Some(data), Some((h, w))) = (&ds.measurements, ds.measurements_shape) {
        s.sample_values = Some(ndarray::Array2::from_shape_vec((h, w), data.clone())
            .map_err(|e| StraditizeError::Dataset(e.to_string()))?);
    }
    if let (Some(data), Some((h, w))) = (&ds.rough_locs, ds.rough_locs_shape) {
        s.rough_locs = Some(ndarray::Array2::from_shape_vec((h, w), data.clone())
            .map_err(|e| StraditizeError::Dataset(e.to_string()))?);
    }
    if !ds.measurement.is_empty() || ds.measurements.is_some() {
        s.sample_rows = Some(ds.measurement.clone());
    }

    for rec in &ds.readers {
        let img = image::RgbaImage::from_raw(rec.image_w, rec.image_h, rec.image_rgba.clone())
            .ok_or_else(|| StraditizeError::Dataset("malformed reader image buffer".into()))?;
        let (bh, bw) = rec.binary_shape;
        let binary = ndarray::Array2::from_shape_vec((bh, bw), rec.binary.clone())
            .map_err(|e| StraditizeError::Dataset(e.to_string()))?;

        let index = s.readers.len();
        let mut reader = Reader::new(index, rec.reader_cls, img, binary, rec.extent);
        reader.columns = rec.columns.clone();
        reader.is_exaggerated = rec.is_exaggerated;
        reader.xaxis = rec.xaxis_translation;
        reader.occurrences = rec.occurrences.iter().copied().collect();
        if let Some(bs) = &mut reader.bar_state {
            if let Some(t) = rec.bar_tolerance {
                bs.tolerance = t;
            }
            bs.min_len = rec.bar_min_len;
            bs.max_len = rec.bar_max_len;
            bs.bars = rec
                .bars
                .iter()
                .map(|&(lo, hi, value)| crate::reader::digitize::Bar { lo, hi, value })
                .collect();
        }
        if let Some(bands) = rec.stacked_bands_added {
            reader.stacked_state = Some(StackedState {
                bands_added: bands,
                band_order: rec.stacked_band_order.clone(),
            });
        }

        if index == 0 {
            reader.parent = 0;
        } else {
            reader.parent = rec.parent;
        }
        s.readers.push(reader);
    }
    for i in 1..s.readers.len() {
        let parent = s.readers[i].parent;
        if parent >= s.readers.len() {
            return Err(StraditizeError::Dataset(format!("reader {i} references unknown parent {parent}")));
        }
        s.readers[parent].children.push(i);
    }

    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReaderKind;
    use image::Rgba;

    #[test]
    fn round_trips_empty_straditizer() {
        let img = image::RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let mut s = Straditizer::new(img);
        s.attrs.insert("image_file".to_string(), "diagram.png".to_string());
        s.set_data_box((0, 10), (0, 10)).unwrap();
        s.init_reader(ReaderKind::Area).unwrap();
        s.set_column_starts(vec![0, 5]).unwrap();

        let ds = to_dataset(&s);
        let back = from_dataset(&ds).unwrap();

        assert_eq!(back.column_starts, s.column_starts);
        assert_eq!(back.column_ends, s.column_ends);
        assert_eq!(back.attrs, s.attrs);
        assert_eq!(back.readers.len(), s.readers.len());
        assert_eq!(back.readers[0].columns, s.readers[0].columns);
    }

    #[test]
    fn round_trips_full_df_and_samples() {
        let img = image::RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let mut s = Straditizer::new(img);
        s.set_data_box((0, 20), (0, 20)).unwrap();
        s.init_reader(ReaderKind::Area).unwrap();
        s.set_column_starts(vec![0, 10]).unwrap();
        s.digitize().unwrap();
        s.find_samples(1, 10000, 2, 0.9).unwrap();

        let ds = to_dataset(&s);
        let back = from_dataset(&ds).unwrap();
        assert_eq!(back.full_df, s.full_df);
        assert_eq!(back.sample_rows, s.sample_rows);
    }
}

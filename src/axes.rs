//! C9 — affine pixel<->data axis translation, shared by the straditizer
//! (Y axis) and each reader (X axis).

use serde::{Deserialize, Serialize};

use crate::error::{Result, StraditizeError};

/// An affine mapping through two (pixel, data) anchor points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub px: (f64, f64),
    pub data: (f64, f64),
}

impl AxisMapping {
    pub fn new(px: (f64, f64), data: (f64, f64)) -> Result<Self> {
        if (px.0 - px.1).abs() < f64::EPSILON {
            return Err(StraditizeError::DegenerateAxis);
        }
        Ok(AxisMapping { px, data })
    }

    fn slope(&self) -> f64 {
        (self.data.1 - self.data.0) / (self.px.1 - self.px.0)
    }

    /// Pixel -> data. Linear in the anchor coordinates.
    pub fn px_to_data(&self, p: f64) -> f64 {
        self.data.0 + self.slope() * (p - self.px.0)
    }

    /// Data -> pixel, the inverse affine map.
    pub fn data_to_px(&self, d: f64) -> f64 {
        self.px.0 + (d - self.data.0) / self.slope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_is_affine() {
        let m = AxisMapping::new((100.0, 500.0), (0.0, 40.0)).unwrap();
        assert_eq!(m.px_to_data(300.0), 20.0);
        assert_eq!(m.data_to_px(30.0), 400.0);
        assert_eq!(m.data_to_px(m.px_to_data(123.0)), 123.0);
    }

    #[test]
    fn rejects_coincident_anchors() {
        assert!(AxisMapping::new((100.0, 100.0), (0.0, 1.0)).is_err());
    }

    #[test]
    fn linearity_holds_for_combinations() {
        let m = AxisMapping::new((0.0, 10.0), (0.0, 100.0)).unwrap();
        let p1 = 2.0;
        let p2 = 6.0;
        let (a, b) = (0.25, 0.75);
        let lhs = m.px_to_data(a * p1 + b * p2);
        let rhs = a * m.px_to_data(p1) + b * m.px_to_data(p2);
        assert!((lhs - rhs).abs() < 1e-9);
    }
}

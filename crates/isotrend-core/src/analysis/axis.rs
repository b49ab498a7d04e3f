//! Display range for a chart's value axis.

use serde::{Deserialize, Serialize};

/// Closed numeric display range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Inputs to [`axis_range`].
#[derive(Debug, Clone, Copy)]
pub struct AxisRequest<'a> {
    /// Plotted values (non-finite entries are ignored)
    pub values: &'a [f64],
    /// Reference lines or bands that must stay visible
    pub thresholds: &'a [f64],
    /// Estimated extents of text labels drawn in data units
    pub label_extents: &'a [f64],
    /// Top padding as a fraction of span or magnitude
    pub top_padding_factor: f64,
}

impl<'a> AxisRequest<'a> {
    pub fn new(values: &'a [f64], top_padding_factor: f64) -> Self {
        Self {
            values,
            thresholds: &[],
            label_extents: &[],
            top_padding_factor,
        }
    }

    pub fn with_thresholds(mut self, thresholds: &'a [f64]) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_label_extents(mut self, label_extents: &'a [f64]) -> Self {
        self.label_extents = label_extents;
        self
    }
}

/// Compute a padded range that fits data, thresholds and labels.
///
/// Empty data defaults to `[0, 1]`. Padding below is
/// `max(10% span, 10% |min|, 0.5)`, above is
/// `max(f·span, f·|max|, 1.0)`. All-non-negative data keeps zero in view at
/// the bottom, all-non-positive data at the top.
pub fn axis_range(request: AxisRequest<'_>) -> AxisRange {
    let finite = |v: &&f64| v.is_finite();

    let data: Vec<f64> = request.values.iter().filter(finite).copied().collect();
    let (mut data_min, mut data_max) = if data.is_empty() {
        (0.0, 1.0)
    } else {
        (
            data.iter().copied().fold(f64::INFINITY, f64::min),
            data.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };

    for extra in request
        .thresholds
        .iter()
        .chain(request.label_extents.iter())
        .filter(finite)
    {
        data_min = data_min.min(*extra);
        data_max = data_max.max(*extra);
    }

    let span = data_max - data_min;
    let factor = request.top_padding_factor;
    let bottom_padding = (span * 0.1).max(data_min.abs() * 0.1).max(0.5);
    let top_padding = (span * factor).max(data_max.abs() * factor).max(1.0);

    let mut min = data_min - bottom_padding;
    let mut max = data_max + top_padding;

    if data_min >= 0.0 {
        min = min.min(0.0);
    }
    if data_max <= 0.0 {
        max = max.max(0.0);
    }

    if min == max {
        min -= 0.5;
        max += 0.5;
    }
    if min > max {
        min = max - 1.0;
    }

    AxisRange { min, max }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_positive_data_includes_zero() {
        let range = axis_range(AxisRequest::new(&[100.0, 120.0], 0.1));
        assert_eq!(range.min, 0.0);
        // top padding = max(2, 12, 1) = 12
        assert!(approx(range.max, 132.0));
    }

    #[test]
    fn test_empty_defaults_to_unit_range() {
        let range = axis_range(AxisRequest::new(&[], 0.1));
        assert!(approx(range.min, -0.5));
        assert!(approx(range.max, 2.0));
    }

    #[test]
    fn test_negative_data_includes_zero_on_top() {
        let range = axis_range(AxisRequest::new(&[-10.0, -20.0], 0.1));
        // bottom padding = max(1, 2, 0.5) = 2
        assert!(approx(range.min, -22.0));
        assert_eq!(range.max, 0.0);
    }

    #[test]
    fn test_mixed_sign_data_not_clamped() {
        let range = axis_range(AxisRequest::new(&[-5.0, 5.0], 0.1));
        assert!(approx(range.min, -6.0));
        assert!(approx(range.max, 6.0));
    }

    #[test]
    fn test_all_zero() {
        let range = axis_range(AxisRequest::new(&[0.0, 0.0], 0.25));
        assert!(approx(range.min, -0.5));
        assert!(approx(range.max, 1.0));
        assert!(range.min < range.max);
    }

    #[test]
    fn test_thresholds_folded_in() {
        let thresholds = [1.47, 1.65, 1.85, 2.1];
        let range = axis_range(AxisRequest::new(&[1.2, 1.3], 0.1).with_thresholds(&thresholds));
        assert!(range.contains(2.1));
        assert!(range.contains(1.2));
        assert_eq!(range.min, 0.0);
    }

    #[test]
    fn test_label_extents_folded_in() {
        let labels = [180.0];
        let range = axis_range(AxisRequest::new(&[100.0, 120.0], 0.25).with_label_extents(&labels));
        assert!(range.max > 180.0);
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let range = axis_range(AxisRequest::new(&[f64::NAN, 4.0, f64::INFINITY], 0.1));
        assert_eq!(range.min, 0.0);
        assert!(approx(range.max, 5.0));
    }
}

use serde::{Deserialize, Serialize};

use crate::buffers::{Image2D, Mask2D};

/// Fraction of samples replaced at each tail before estimating a mode.
const WINSORIZE_FRACTION: f64 = 0.1;

pub struct StatsHelper;

impl StatsHelper {
    /// Finite samples of `image` whose mask entry is unset.
    pub fn unflagged_values(image: &Image2D, mask: &Mask2D) -> Vec<f32> {
        let mut values = Vec::with_capacity(image.width() * image.height());
        for y in 0..image.height() {
            let flags = mask.row(y);
            values.extend(
                image
                    .row(y)
                    .iter()
                    .zip(flags)
                    .filter(|&(v, &flagged)| !flagged && v.is_finite())
                    .map(|(&v, _)| v),
            );
        }
        values
    }

    /// Rayleigh mode `sqrt(Σv² / 2n)` of the unflagged samples after clamping
    /// the lowest and highest 10% to the values at those ranks.
    pub fn winsorized_mode(image: &Image2D, mask: &Mask2D) -> f64 {
        let mut values = Self::unflagged_values(image, mask);
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let n = values.len();
        let cut = (n as f64 * WINSORIZE_FRACTION) as usize;
        let low = values[cut] as f64;
        let high = values[n - 1 - cut] as f64;
        let sum_sq: f64 = values
            .iter()
            .map(|&v| {
                let v = (v as f64).clamp(low, high);
                v * v
            })
            .sum();
        (sum_sq / (2.0 * n as f64)).sqrt()
    }

    /// Mean and population standard deviation.
    pub fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
        if values.is_empty() {
            return (0.0, 0.0);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    /// Median of `values`, reordering them in place.
    pub fn median(values: &mut [f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        let mid = values.len() / 2;
        let (_, &mut upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        if values.len() % 2 == 1 {
            Some(upper)
        } else {
            let lower = values[..mid]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            Some((lower + upper) / 2.0)
        }
    }
}

/// Inclusive value range of the unflagged samples of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Margin added on both sides of a range that collapsed to one value.
    pub const DEGENERATE_MARGIN: f32 = 1.0;

    pub fn of_unflagged(image: &Image2D, mask: &Mask2D) -> Option<Self> {
        let values = StatsHelper::unflagged_values(image, mask);
        let first = *values.first()?;
        let range = values.iter().fold(
            ValueRange {
                min: first,
                max: first,
            },
            |acc, &v| ValueRange {
                min: acc.min.min(v),
                max: acc.max.max(v),
            },
        );
        Some(range.widened())
    }

    pub fn widened(self) -> Self {
        if self.min == self.max {
            ValueRange {
                min: self.min - Self::DEGENERATE_MARGIN,
                max: self.max + Self::DEGENERATE_MARGIN,
            }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_stddev_of_empty_and_spread_values() {
        assert_eq!(StatsHelper::mean_and_stddev(&[]), (0.0, 0.0));
        assert_eq!(StatsHelper::mean_and_stddev(&[1.0, 3.0]), (2.0, 1.0));
    }

    #[test]
    fn winsorized_mode_ignores_flagged_outlier() {
        let mut image = Image2D::with_value(4, 4, 2.0);
        image.set_value(1, 1, 500.0);
        let mut mask = Mask2D::new(4, 4);
        mask.set_value(1, 1, true);
        let mode = StatsHelper::winsorized_mode(&image, &mask);
        assert!((mode - 2.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn winsorized_mode_clamps_unflagged_outlier() {
        let mut image = Image2D::with_value(10, 10, 1.0);
        image.set_value(3, 3, 1000.0);
        let mode = StatsHelper::winsorized_mode(&image, &Mask2D::new(10, 10));
        assert!((mode - 0.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(StatsHelper::median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(StatsHelper::median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(StatsHelper::median(&mut []), None);
    }

    #[test]
    fn degenerate_range_is_widened_symmetrically() {
        let image = Image2D::with_value(3, 3, 5.0);
        let range = ValueRange::of_unflagged(&image, &Mask2D::new(3, 3)).unwrap();
        assert_eq!(range, ValueRange { min: 4.0, max: 6.0 });
        assert!(ValueRange::of_unflagged(&image, &Mask2D::with_value(3, 3, true)).is_none());
    }
}

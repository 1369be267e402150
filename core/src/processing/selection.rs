//! Whole-channel and whole-timestep flagging from RMS outliers.
use crate::buffers::{Image2D, Mask2D};
use crate::math::StatsHelper;
use crate::prelude::FlagResult;

/// Flag every channel (row) whose RMS exceeds the mean channel RMS by more
/// than `threshold` standard deviations. Repeats until stable, so strong
/// outliers do not hide weaker ones.
pub fn flag_outlier_channels(image: &Image2D, mask: &mut Mask2D, threshold: f64) -> FlagResult<usize> {
    check(image, mask)?;
    let rms: Vec<Option<f64>> = (0..image.height())
        .map(|y| line_rms((0..image.width()).map(|x| (image.value(x, y), mask.value(x, y)))))
        .collect();
    let outliers = iterative_outliers(rms, threshold);
    for &y in &outliers {
        mask.row_mut(y).fill(true);
    }
    Ok(outliers.len())
}

/// Timestep (column) counterpart of [`flag_outlier_channels`].
pub fn flag_outlier_timesteps(image: &Image2D, mask: &mut Mask2D, threshold: f64) -> FlagResult<usize> {
    check(image, mask)?;
    let rms: Vec<Option<f64>> = (0..image.width())
        .map(|x| line_rms((0..image.height()).map(|y| (image.value(x, y), mask.value(x, y)))))
        .collect();
    let outliers = iterative_outliers(rms, threshold);
    for &x in &outliers {
        for y in 0..mask.height() {
            mask.set_value(x, y, true);
        }
    }
    Ok(outliers.len())
}

fn check(image: &Image2D, mask: &Mask2D) -> FlagResult<()> {
    mask.check_fits(image, "sample selection")
}

/// RMS of the unflagged finite samples; `None` when there are none.
fn line_rms(samples: impl Iterator<Item = (f32, bool)>) -> Option<f64> {
    let (sum_sq, count) = samples
        .filter(|&(v, flagged)| !flagged && v.is_finite())
        .fold((0.0f64, 0usize), |(s, c), (v, _)| (s + (v as f64) * (v as f64), c + 1));
    (count > 0).then(|| (sum_sq / count as f64).sqrt())
}

fn iterative_outliers(values: Vec<Option<f64>>, threshold: f64) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    let mut outliers = Vec::new();
    loop {
        let samples: Vec<f64> = remaining.iter().map(|&(_, v)| v).collect();
        let (mean, stddev) = StatsHelper::mean_and_stddev(&samples);
        let limit = mean + threshold * stddev;
        let (bad, good): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|&(_, v)| v > limit);
        remaining = good;
        if bad.is_empty() {
            break;
        }
        outliers.extend(bad.into_iter().map(|(i, _)| i));
    }
    outliers.sort_unstable();
    outliers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_channel_is_flagged() {
        let mut image = Image2D::with_value(10, 40, 1.0);
        for x in 0..10 {
            image.set_value(x, 17, 30.0);
        }
        let mut mask = Mask2D::new(10, 40);
        assert_eq!(flag_outlier_channels(&image, &mut mask, 3.0).unwrap(), 1);
        assert!(mask.row(17).iter().all(|&f| f));
        assert_eq!(mask.count_flagged(), 10);
    }

    #[test]
    fn loud_timestep_is_flagged() {
        let mut image = Image2D::with_value(40, 6, 1.0);
        for y in 0..6 {
            image.set_value(25, y, -20.0);
        }
        let mut mask = Mask2D::new(40, 6);
        assert_eq!(flag_outlier_timesteps(&image, &mut mask, 3.5).unwrap(), 1);
        assert!((0..6).all(|y| mask.value(25, y)));
    }

    #[test]
    fn flat_data_is_left_alone() {
        let image = Image2D::with_value(8, 8, 1.0);
        let mut mask = Mask2D::new(8, 8);
        assert_eq!(flag_outlier_channels(&image, &mut mask, 3.0).unwrap(), 0);
        assert_eq!(flag_outlier_timesteps(&image, &mut mask, 3.0).unwrap(), 0);
        assert!(mask.is_clear());
    }

    #[test]
    fn flagged_samples_do_not_count() {
        let mut image = Image2D::with_value(10, 20, 1.0);
        image.set_value(3, 5, 1e6);
        let mut mask = Mask2D::new(10, 20);
        mask.set_value(3, 5, true);
        assert_eq!(flag_outlier_channels(&image, &mut mask, 3.0).unwrap(), 0);
    }
}

use crate::buffers::{Image2D, Mask2D};
use crate::math::StatsHelper;
use crate::prelude::FlagResult;

/// Flatten the bandpass: split the channels into `steps` contiguous groups
/// and divide each group by the median of its unflagged samples. Groups whose
/// median is zero or not finite are left as they are.
pub fn calibrate_passband(image: &mut Image2D, mask: &Mask2D, steps: usize) -> FlagResult<()> {
    mask.check_fits(image, "passband calibration")?;
    let height = image.height();
    if height == 0 {
        return Ok(());
    }
    let steps = steps.clamp(1, height);
    for step in 0..steps {
        let (start, end) = (step * height / steps, (step + 1) * height / steps);
        let mut values: Vec<f32> = (start..end)
            .flat_map(|y| {
                image
                    .row(y)
                    .iter()
                    .zip(mask.row(y))
                    .filter(|&(v, &flagged)| !flagged && v.is_finite())
                    .map(|(&v, _)| v)
                    .collect::<Vec<_>>()
            })
            .collect();
        let Some(median) = StatsHelper::median(&mut values) else {
            continue;
        };
        if median == 0.0 || !median.is_finite() {
            continue;
        }
        for y in start..end {
            for v in image.row_mut(y) {
                *v /= median;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_normalized_to_unit_median() {
        let mut image = Image2D::new(4, 4);
        for y in 0..4 {
            let gain = if y < 2 { 2.0 } else { 8.0 };
            image.row_mut(y).fill(gain);
        }
        calibrate_passband(&mut image, &Mask2D::new(4, 4), 2).unwrap();
        for y in 0..4 {
            assert!(image.row(y).iter().all(|&v| v == 1.0));
        }
    }

    #[test]
    fn zero_median_group_is_skipped() {
        let mut image = Image2D::new(3, 2);
        calibrate_passband(&mut image, &Mask2D::new(3, 2), 48).unwrap();
        assert!(image.row(0).iter().all(|&v| v == 0.0));
    }
}

//! SumThreshold detector.
//!
//! For window lengths 1, 2, 4, … a window whose mean over its unflagged
//! samples exceeds the length's threshold gets all of its samples flagged.
//! Flags found at one length are excluded from the sums of the next lengths,
//! which lets long faint features surface once bright short ones are masked.
use serde::{Deserialize, Serialize};

use crate::buffers::{Image2D, Mask2D};
use crate::math::StatsHelper;
use crate::prelude::FlagResult;

/// Threshold curve `first_threshold · exponent_base^log2(L) / L`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub first_threshold: f64,
    pub exponent_base: f64,
    pub max_length: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            first_threshold: 6.0,
            exponent_base: 1.5,
            max_length: 256,
        }
    }
}

impl ThresholdConfig {
    pub fn threshold(&self, length: usize) -> f64 {
        let length = length.max(1) as f64;
        self.first_threshold * self.exponent_base.powf(length.log2()) / length
    }

    /// Window lengths used along an axis of `axis_len` samples.
    pub fn lengths(&self, axis_len: usize) -> Vec<usize> {
        let bound = self.max_length.min(axis_len);
        std::iter::successors(Some(1usize), |&l| l.checked_mul(2))
            .take_while(|&l| l <= bound)
            .collect()
    }
}

/// Per-direction sensitivities; `None` disables that direction.
#[derive(Debug, Clone, Copy)]
pub struct Sensitivities {
    pub time: Option<f64>,
    pub frequency: Option<f64>,
}

/// Flag `mask` in place from `image`. Existing flags are kept.
pub fn sum_threshold(
    config: &ThresholdConfig,
    image: &Image2D,
    mask: &mut Mask2D,
    sensitivities: Sensitivities,
) -> FlagResult<()> {
    mask.check_fits(image, "sumthreshold")?;
    if image.is_empty() {
        return Ok(());
    }
    let mode = StatsHelper::winsorized_mode(image, mask);
    let scale = if mode == 0.0 { 1.0 } else { mode };
    let longest = image.width().max(image.height());
    for length in config.lengths(longest) {
        let threshold = config.threshold(length) * scale;
        if let Some(sensitivity) = sensitivities.time {
            if length <= image.width() {
                horizontal(image, mask, length, threshold * sensitivity);
            }
        }
        if let Some(sensitivity) = sensitivities.frequency {
            if length <= image.height() {
                vertical(image, mask, length, threshold * sensitivity);
            }
        }
    }
    Ok(())
}

/// One sliding-window pass over a line. `include(i)` tells whether sample
/// `i` contributes; flagged windows are marked through `flag(start, end)`.
fn scan_line(
    len: usize,
    length: usize,
    threshold: f64,
    value: impl Fn(usize) -> f32,
    include: impl Fn(usize) -> bool,
    mut flag: impl FnMut(usize, usize),
) {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for i in 0..len {
        if include(i) {
            sum += value(i) as f64;
            count += 1;
        }
        if i + 1 < length {
            continue;
        }
        let start = i + 1 - length;
        if count > 0 && (sum / count as f64).abs() > threshold {
            flag(start, i + 1);
        }
        if include(start) {
            sum -= value(start) as f64;
            count -= 1;
        }
    }
}

fn horizontal(image: &Image2D, mask: &mut Mask2D, length: usize, threshold: f64) {
    let mut scratch = mask.clone();
    for y in 0..image.height() {
        let values = image.row(y);
        let flags = mask.row(y);
        let out = scratch.row_mut(y);
        scan_line(
            values.len(),
            length,
            threshold,
            |x| values[x],
            |x| !flags[x] && values[x].is_finite(),
            |start, end| out[start..end].fill(true),
        );
    }
    *mask = scratch;
}

fn vertical(image: &Image2D, mask: &mut Mask2D, length: usize, threshold: f64) {
    let mut scratch = mask.clone();
    for x in 0..image.width() {
        scan_line(
            image.height(),
            length,
            threshold,
            |y| image.value(x, y),
            |y| !mask.value(x, y) && image.value(x, y).is_finite(),
            |start, end| {
                for y in start..end {
                    scratch.set_value(x, y, true);
                }
            },
        );
    }
    *mask = scratch;
}

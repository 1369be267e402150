//! Masked Gaussian smoothing used as the background model.
use serde::{Deserialize, Serialize};

use crate::buffers::{Image2D, Mask2D};
use crate::math::gaussian_kernel;
use crate::prelude::FlagResult;
use crate::processing::buffer_pool::BufferPool;

/// Separable kernel parameters. Windows are in samples (rounded up to odd),
/// kernel widths are variances in samples².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPassFilter {
    pub window_width: usize,
    pub window_height: usize,
    pub h_kernel_sigma_sq: f64,
    pub v_kernel_sigma_sq: f64,
}

impl Default for HighPassFilter {
    fn default() -> Self {
        Self {
            window_width: 21,
            window_height: 31,
            h_kernel_sigma_sq: 7.5,
            v_kernel_sigma_sq: 15.0,
        }
    }
}

/// Buffers checked out per low-pass evaluation.
pub const SCRATCH_BUFFERS: usize = 4;

impl HighPassFilter {
    /// Smooth background of `image`: every output sample is `Σw·v / Σw`
    /// over the unflagged samples of the window around it, with the window
    /// clipped at the image edges. Samples with no unflagged neighbours in
    /// reach are set to zero.
    pub fn low_pass(&self, image: &Image2D, mask: &Mask2D, pool: &mut BufferPool) -> FlagResult<Image2D> {
        mask.check_fits(image, "high-pass filter")?;
        let (width, height) = (image.width(), image.height());
        let n = width * height;
        let mut values = pool.checkout(n)?;
        let mut weights = pool.checkout(n)?;
        for y in 0..height {
            let (src, flags) = (image.row(y), mask.row(y));
            for x in 0..width {
                if !flags[x] && src[x].is_finite() {
                    values[y * width + x] = src[x];
                    weights[y * width + x] = 1.0;
                }
            }
        }

        let h_kernel = gaussian_kernel(self.window_width.max(1), self.h_kernel_sigma_sq);
        let v_kernel = gaussian_kernel(self.window_height.max(1), self.v_kernel_sigma_sq);

        let mut h_values = pool.checkout(n)?;
        let mut h_weights = pool.checkout(n)?;
        convolve_rows(&values, &mut h_values, width, height, &h_kernel);
        convolve_rows(&weights, &mut h_weights, width, height, &h_kernel);
        convolve_columns(&h_values, &mut values, width, height, &v_kernel);
        convolve_columns(&h_weights, &mut weights, width, height, &v_kernel);

        let mut out = Image2D::new(width, height);
        for y in 0..height {
            for (x, dst) in out.row_mut(y).iter_mut().enumerate() {
                let w = weights[y * width + x];
                *dst = if w > 0.0 { values[y * width + x] / w } else { 0.0 };
            }
        }
        for buffer in [values, weights, h_values, h_weights] {
            pool.release(buffer);
        }
        Ok(out)
    }

    /// `image` minus its low-pass background.
    pub fn high_pass(&self, image: &Image2D, mask: &Mask2D, pool: &mut BufferPool) -> FlagResult<Image2D> {
        let background = self.low_pass(image, mask, pool)?;
        image.difference(&background)
    }
}

fn convolve_rows(src: &[f32], dst: &mut [f32], width: usize, height: usize, kernel: &[f32]) {
    let mid = kernel.len() / 2;
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let first = x.saturating_sub(mid);
            let last = (x + mid).min(width - 1);
            dst[y * width + x] = (first..=last)
                .map(|i| kernel[i + mid - x] * row[i])
                .sum();
        }
    }
}

fn convolve_columns(src: &[f32], dst: &mut [f32], width: usize, height: usize, kernel: &[f32]) {
    let mid = kernel.len() / 2;
    for y in 0..height {
        let first = y.saturating_sub(mid);
        let last = (y + mid).min(height - 1);
        for x in 0..width {
            dst[y * width + x] = (first..=last)
                .map(|j| kernel[j + mid - y] * src[j * width + x])
                .sum();
        }
    }
}

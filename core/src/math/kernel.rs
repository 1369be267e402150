/// Sampled Gaussian weights `exp(-x² / (2σ²))` centred in a window of
/// `size` taps. `size` is forced odd so the window has a middle sample.
pub fn gaussian_kernel(size: usize, sigma_sq: f64) -> Vec<f32> {
    let size = if size % 2 == 0 { size + 1 } else { size };
    let mid = (size / 2) as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 - mid;
            if sigma_sq > 0.0 {
                (-(x * x) / (2.0 * sigma_sq)).exp() as f32
            } else if x == 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

use anyhow::{ensure, Context};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rficore::{FlagMask, Flagger, ImageSet};
use serde::{Deserialize, Serialize};

use super::template::RfiEvent;

/// Configuration for generating synthetic visibilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub antennas: usize,
    pub timesteps: usize,
    pub channels: usize,
    /// Images per baseline: 1 (amplitude), 2, 4 or 8 (complex pairs).
    pub image_count: usize,
    pub noise: f32,
    pub seed: u64,
    pub rfi_amplitude: f32,
    pub narrowband_count: usize,
    pub broadband_count: usize,
    pub spike_count: usize,
    /// Hz.
    pub start_frequency: f64,
    /// Hz.
    pub channel_width: f64,
    /// Seconds.
    pub time_resolution: f64,
    pub description: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            antennas: 4,
            timesteps: 64,
            channels: 32,
            image_count: 2,
            noise: 0.05,
            seed: 0,
            rfi_amplitude: 50.0,
            narrowband_count: 1,
            broadband_count: 1,
            spike_count: 4,
            start_frequency: 140e6,
            channel_width: 10e3,
            time_resolution: 1.0,
            description: None,
        }
    }
}

impl GeneratorConfig {
    pub fn baseline_count(&self) -> usize {
        self.antennas * self.antennas.saturating_sub(1) / 2
    }

    pub fn polarization_count(&self) -> usize {
        (self.image_count / 2).max(1)
    }

    pub fn scan_times(&self) -> Vec<f64> {
        (0..self.timesteps)
            .map(|t| t as f64 * self.time_resolution)
            .collect()
    }

    pub fn channel_frequencies(&self) -> Vec<f64> {
        (0..self.channels)
            .map(|c| self.start_frequency + c as f64 * self.channel_width)
            .collect()
    }

    pub fn centre_frequency(&self) -> f64 {
        self.start_frequency + self.channels as f64 * self.channel_width / 2.0
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.antennas >= 2, "need at least two antennas, got {}", self.antennas);
        ensure!(
            self.timesteps > 0 && self.channels > 0,
            "empty observation of {}x{}",
            self.timesteps,
            self.channels
        );
        ensure!(self.noise >= 0.0, "negative noise level {}", self.noise);
        Ok(())
    }
}

/// One baseline of synthetic data plus the interference that was injected.
#[derive(Debug, Clone)]
pub struct SyntheticBaseline {
    pub antenna1: usize,
    pub antenna2: usize,
    pub images: ImageSet,
    pub truth: FlagMask,
    pub events: Vec<RfiEvent>,
}

fn random_events(config: &GeneratorConfig, rng: &mut StdRng) -> Vec<RfiEvent> {
    let mut events = Vec::new();
    for _ in 0..config.narrowband_count {
        events.push(RfiEvent::Narrowband {
            channel: rng.gen_range(0..config.channels),
        });
    }
    for _ in 0..config.broadband_count {
        events.push(RfiEvent::Broadband {
            timestep: rng.gen_range(0..config.timesteps),
        });
    }
    for _ in 0..config.spike_count {
        events.push(RfiEvent::Spike {
            channel: rng.gen_range(0..config.channels),
            timestep: rng.gen_range(0..config.timesteps),
        });
    }
    events
}

fn noisy_array(config: &GeneratorConfig, level: f32, rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_fn((config.channels, config.timesteps), |_| {
        if config.noise > 0.0 {
            level + rng.gen_range(-config.noise..config.noise)
        } else {
            level
        }
    })
}

fn truth_mask(flagger: &Flagger, truth: &Array2<bool>) -> FlagMask {
    let (height, width) = truth.dim();
    let mut mask = flagger.make_flag_mask(width, height);
    let stride = mask.horizontal_stride();
    let buffer = mask.buffer_mut();
    for ((y, x), &flagged) in truth.indexed_iter() {
        buffer[y * stride + x] = flagged;
    }
    mask
}

/// Builds baseline `index`. Every baseline draws from its own seeded
/// generator, so the result does not depend on generation order.
pub fn build_baseline(
    flagger: &Flagger,
    config: &GeneratorConfig,
    index: usize,
    antenna1: usize,
    antenna2: usize,
) -> anyhow::Result<SyntheticBaseline> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));
    let mut images = flagger
        .make_image_set(config.timesteps, config.channels, config.image_count)
        .context("allocating synthetic images")?;
    let events = random_events(config, &mut rng);
    let mut truth = Array2::from_elem((config.channels, config.timesteps), false);
    for event in &events {
        event.mark(&mut truth);
    }

    let step = if config.image_count == 1 { 1 } else { 2 };
    for slot in 0..config.image_count {
        let is_real = slot % step == 0;
        let mut samples = noisy_array(config, if is_real { 1.0 } else { 0.0 }, &mut rng);
        if is_real {
            for event in &events {
                event.apply(&mut samples, config.rfi_amplitude);
            }
        }
        images
            .set_image_from_array(slot, samples.view())
            .with_context(|| format!("loading synthetic image {slot}"))?;
    }

    Ok(SyntheticBaseline {
        antenna1,
        antenna2,
        images,
        truth: truth_mask(flagger, &truth),
        events,
    })
}

/// Cross-correlation baselines of every antenna pair, in antenna order.
pub fn build_baselines(flagger: &Flagger, config: &GeneratorConfig) -> anyhow::Result<Vec<SyntheticBaseline>> {
    let mut baselines = Vec::with_capacity(config.baseline_count());
    for antenna1 in 0..config.antennas {
        for antenna2 in antenna1 + 1..config.antennas {
            let index = baselines.len();
            baselines.push(build_baseline(flagger, config, index, antenna1, antenna2)?);
        }
    }
    log::info!(
        "generated {} baselines of {}x{} with {} images each",
        baselines.len(),
        config.timesteps,
        config.channels,
        config.image_count
    );
    Ok(baselines)
}

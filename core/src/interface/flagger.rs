//! Public entry point: build strategies, run them on image sets and collect
//! statistics.
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::buffers::Mask2D;
use crate::data::{ArtifactSet, TelescopeId, TimeFrequencyData, TimeFrequencyMetadata};
use crate::interface::image_set::ImageSet;
use crate::interface::quality::QualityStatistics;
use crate::prelude::{FlagError, FlagResult, NullProgressListener, ProgressListener};
use crate::quality::{SampleColumn, SampleKey, StatisticsReport};
use crate::strategy::{self, Strategy, StrategyFlags, StrategyOptions};
use crate::telemetry::LogManager;

/// Flags of one baseline, laid out like the images of an [`ImageSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlagMask {
    mask: Mask2D,
}

impl FlagMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            mask: Mask2D::new(width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.mask.width()
    }

    pub fn height(&self) -> usize {
        self.mask.height()
    }

    pub fn horizontal_stride(&self) -> usize {
        self.mask.stride()
    }

    pub fn buffer(&self) -> &[bool] {
        self.mask.data()
    }

    pub fn buffer_mut(&mut self) -> &mut [bool] {
        self.mask.data_mut()
    }

    pub fn mask(&self) -> &Mask2D {
        &self.mask
    }

    fn check_fits(&self, images: &ImageSet, what: &str) -> FlagResult<()> {
        if self.width() == images.width() && self.height() == images.height() {
            Ok(())
        } else {
            Err(FlagError::invalid(format!(
                "{what} of {}x{} does not fit images of {}x{}",
                self.width(),
                self.height(),
                images.width(),
                images.height()
            )))
        }
    }
}

impl From<Mask2D> for FlagMask {
    fn from(mask: Mask2D) -> Self {
        Self { mask }
    }
}

/// Stateless facade over the engine. Every method can be called from many
/// threads at once; a [`Strategy`] may be shared between concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct Flagger {
    logger: LogManager,
}

impl Flagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_image_set(&self, width: usize, height: usize, count: usize) -> FlagResult<ImageSet> {
        ImageSet::new(width, height, count, 0.0)
    }

    pub fn make_image_set_with_value(
        &self,
        width: usize,
        height: usize,
        count: usize,
        initial_value: f32,
    ) -> FlagResult<ImageSet> {
        ImageSet::new(width, height, count, initial_value)
    }

    pub fn make_flag_mask(&self, width: usize, height: usize) -> FlagMask {
        FlagMask::new(width, height)
    }

    /// Default strategy tuned for `telescope` and `flags`. The frequency and
    /// resolutions are in Hz and seconds; 0 means unknown.
    pub fn make_strategy(
        &self,
        telescope: TelescopeId,
        flags: StrategyFlags,
        frequency: f64,
        time_resolution: f64,
        frequency_resolution: f64,
    ) -> Strategy {
        strategy::build_strategy(&StrategyOptions {
            telescope,
            flags,
            frequency,
            time_resolution,
            frequency_resolution,
        })
    }

    pub fn load_strategy(&self, path: impl AsRef<Path>) -> FlagResult<Strategy> {
        strategy::load_strategy(path)
    }

    pub fn save_strategy(&self, strategy: &Strategy, path: impl AsRef<Path>) -> FlagResult<()> {
        strategy::save_strategy(strategy, path)
    }

    /// Execute `strategy` on `input` and return the resulting flags.
    pub fn run(&self, strategy: &Strategy, input: &ImageSet) -> FlagResult<FlagMask> {
        self.run_with(strategy, input, None, &NullProgressListener)
    }

    /// Like [`run`](Self::run), with flags that were already present in the
    /// data (for example from the correlator). The default strategy keeps
    /// them in its output.
    pub fn run_with_flags(
        &self,
        strategy: &Strategy,
        input: &ImageSet,
        existing: &FlagMask,
    ) -> FlagResult<FlagMask> {
        self.run_with(strategy, input, Some(existing), &NullProgressListener)
    }

    pub fn run_with(
        &self,
        strategy: &Strategy,
        input: &ImageSet,
        existing: Option<&FlagMask>,
        listener: &dyn ProgressListener,
    ) -> FlagResult<FlagMask> {
        strategy.validate()?;
        let mut data = TimeFrequencyData::from_image_count(input.images())?;
        if let Some(existing) = existing {
            existing.check_fits(input, "existing flag mask")?;
            data.set_global_mask(Arc::new(existing.mask.clone()))?;
        }
        let metadata = TimeFrequencyMetadata::default();
        let mut artifacts =
            ArtifactSet::new(data, Arc::new(Mutex::new(()))).with_metadata(metadata);
        self.logger.trace_step(&format!(
            "running strategy on {} images of {}x{}",
            input.image_count(),
            input.width(),
            input.height()
        ));
        strategy.perform(&mut artifacts, listener)?;
        let mask = artifacts.contaminated().single_mask();
        self.logger.trace_step(&format!(
            "run finished with {} of {} samples flagged",
            mask.count_flagged(),
            input.width() * input.height()
        ));
        Ok(mask.into())
    }

    pub fn make_quality_statistics(
        &self,
        scan_times: &[f64],
        channel_frequencies: &[f64],
        polarization_count: usize,
    ) -> QualityStatistics {
        QualityStatistics::new(scan_times, channel_frequencies, polarization_count)
    }

    /// Add the samples of one baseline to `destination`. Timestep `t` is
    /// recorded at `scan_times[t]`. A single image is taken as both the real
    /// and imaginary part; otherwise polarization `p` reads images `2p` and
    /// `2p + 1`.
    pub fn collect_statistics(
        &self,
        destination: &mut QualityStatistics,
        images: &ImageSet,
        rfi_flags: &FlagMask,
        correlator_flags: &FlagMask,
        antenna1: usize,
        antenna2: usize,
    ) -> FlagResult<()> {
        rfi_flags.check_fits(images, "rfi flag mask")?;
        correlator_flags.check_fits(images, "correlator flag mask")?;
        if images.width() > destination.scan_times().len() {
            return Err(FlagError::invalid(format!(
                "{} timesteps but only {} scan times",
                images.width(),
                destination.scan_times().len()
            )));
        }
        if images.height() != destination.channel_frequencies().len() {
            return Err(FlagError::invalid(format!(
                "{} channels but {} channel frequencies",
                images.height(),
                destination.channel_frequencies().len()
            )));
        }
        if images.height() == 0 {
            return Ok(());
        }

        let polarization_count = match images.image_count() {
            1 => 1,
            count => count / 2,
        };
        let components: Vec<(usize, usize)> = (0..polarization_count)
            .map(|p| {
                if images.image_count() == 1 {
                    (0, 0)
                } else {
                    (2 * p, 2 * p + 1)
                }
            })
            .collect();

        for t in 0..images.width() {
            let time = destination.scan_times()[t];
            for (polarization, &(re, im)) in components.iter().enumerate() {
                let column = SampleColumn {
                    real: &images.image_buffer(re)?[t..],
                    imaginary: &images.image_buffer(im)?[t..],
                    sample_stride: images.horizontal_stride(),
                    rfi_flags: &rfi_flags.buffer()[t..],
                    correlator_flags: &correlator_flags.buffer()[t..],
                    flag_stride: rfi_flags.horizontal_stride(),
                };
                let key = SampleKey {
                    antenna1,
                    antenna2,
                    time,
                    band: 0,
                    polarization,
                };
                destination.collection_mut().add(key, &column)?;
            }
        }
        Ok(())
    }

    /// Flush `statistics` to `path` as JSON tables.
    pub fn write_statistics(&self, statistics: &QualityStatistics, path: impl AsRef<Path>) -> FlagResult<()> {
        let path = path.as_ref();
        StatisticsReport::from_collection(statistics.collection()).write(path)?;
        self.logger
            .record(&format!("statistics written to {}", path.display()));
        Ok(())
    }
}

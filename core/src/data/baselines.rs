//! Boundary to the external collaborator that reads baselines and stores
//! their flags (a measurement set in a full deployment).
use std::sync::Mutex;

use crate::buffers::{Image2D, Mask2D};
use crate::data::metadata::{Baseline, TimeFrequencyMetadata};
use crate::data::time_frequency::TimeFrequencyData;
use crate::math::StatsHelper;
use crate::prelude::{FlagError, FlagResult};

#[derive(Debug, Clone)]
pub struct BaselineData {
    pub data: TimeFrequencyData,
    pub metadata: TimeFrequencyMetadata,
}

impl BaselineData {
    pub fn baseline(&self) -> Option<Baseline> {
        self.metadata.baseline
    }
}

/// Flag statistics of one baseline, gathered while the baselines of a run
/// are flagged and compared once all of them are done.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineRecord {
    pub baseline: Baseline,
    pub width: usize,
    pub height: usize,
    pub flagged: usize,
    /// RMS of the unflagged samples.
    pub rms: f64,
}

impl BaselineRecord {
    pub fn measure(baseline: Baseline, image: &Image2D, mask: &Mask2D) -> FlagResult<Self> {
        mask.check_fits(image, "baseline record")?;
        let values = StatsHelper::unflagged_values(image, mask);
        let rms = if values.is_empty() {
            0.0
        } else {
            let sum_sq: f64 = values.iter().map(|&v| f64::from(v) * f64::from(v)).sum();
            (sum_sq / values.len() as f64).sqrt()
        };
        Ok(Self {
            baseline,
            width: mask.width(),
            height: mask.height(),
            flagged: mask.count_flagged(),
            rms,
        })
    }

    pub fn flagged_ratio(&self) -> f64 {
        let total = self.width * self.height;
        if total == 0 {
            0.0
        } else {
            self.flagged as f64 / total as f64
        }
    }
}

/// Source and sink of per-baseline data. Calls are made while holding the
/// artifact set's shared lock, so implementations see them one at a time.
pub trait BaselineSource: Send + Sync {
    fn baseline_count(&self) -> usize;
    fn read_baseline(&self, index: usize) -> FlagResult<BaselineData>;
    fn write_flags(&self, baseline: Baseline, flags: &Mask2D) -> FlagResult<()>;
}

/// Baselines held in memory; written flags are collected for inspection.
#[derive(Debug, Default)]
pub struct MemoryBaselineSource {
    baselines: Vec<BaselineData>,
    written: Mutex<Vec<(Baseline, Mask2D)>>,
}

impl MemoryBaselineSource {
    pub fn new(baselines: Vec<BaselineData>) -> Self {
        Self {
            baselines,
            written: Mutex::new(Vec::new()),
        }
    }

    /// Drain the flags written so far, in write order.
    pub fn take_flags(&self) -> FlagResult<Vec<(Baseline, Mask2D)>> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| FlagError::inconsistent("flag store lock poisoned"))?;
        Ok(std::mem::take(&mut *written))
    }
}

impl BaselineSource for MemoryBaselineSource {
    fn baseline_count(&self) -> usize {
        self.baselines.len()
    }

    fn read_baseline(&self, index: usize) -> FlagResult<BaselineData> {
        self.baselines
            .get(index)
            .cloned()
            .ok_or_else(|| FlagError::invalid(format!("baseline index {index} out of range")))
    }

    fn write_flags(&self, baseline: Baseline, flags: &Mask2D) -> FlagResult<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| FlagError::inconsistent("flag store lock poisoned"))?;
        written.push((baseline, flags.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_measures_unflagged_rms_and_ratio() {
        let mut image = Image2D::new(2, 2);
        image.set_value(0, 0, 3.0);
        image.set_value(1, 0, 4.0);
        image.set_value(0, 1, 100.0);
        image.set_value(1, 1, -100.0);
        let mut mask = Mask2D::new(2, 2);
        mask.row_mut(1).fill(true);

        let record = BaselineRecord::measure(Baseline::new(0, 1), &image, &mask).unwrap();
        assert_eq!(record.flagged, 2);
        assert_eq!(record.flagged_ratio(), 0.5);
        assert!((record.rms - 12.5f64.sqrt()).abs() < 1e-12);

        let all = Mask2D::with_value(2, 2, true);
        assert_eq!(BaselineRecord::measure(Baseline::new(0, 1), &image, &all).unwrap().rms, 0.0);
        assert!(BaselineRecord::measure(Baseline::new(0, 1), &image, &Mask2D::new(3, 2)).is_err());
    }
}

//! Detector and background-model actions.
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::ArtifactSet;
use crate::prelude::{FlagError, FlagResult, ProgressListener};
use crate::processing::high_pass::SCRATCH_BUFFERS;
use crate::processing::{
    calibrate_passband, flag_outlier_channels, flag_outlier_timesteps, sum_threshold, BufferPool,
    HighPassFilter, Sensitivities, ThresholdConfig,
};
use crate::strategy::action::FlagAction;

/// SumThreshold on the amplitude of the contaminated data, at
/// `base_sensitivity` times the sensitivity of the enclosing blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SumThresholdAction {
    pub base_sensitivity: f64,
    pub time_direction_flagging: bool,
    pub frequency_direction_flagging: bool,
    pub thresholds: ThresholdConfig,
}

impl Default for SumThresholdAction {
    fn default() -> Self {
        Self {
            base_sensitivity: 1.0,
            time_direction_flagging: true,
            frequency_direction_flagging: true,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl SumThresholdAction {
    pub fn with_sensitivity(base_sensitivity: f64) -> Self {
        Self {
            base_sensitivity,
            ..Self::default()
        }
    }
}

impl FlagAction for SumThresholdAction {
    fn description(&self) -> String {
        "SumThreshold".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let sensitivity = self.base_sensitivity * artifacts.sensitivity();
        let data = artifacts.contaminated();
        let image = data.single_image();
        let mut mask = data.single_mask();
        let before = mask.count_flagged();
        let sensitivities = Sensitivities {
            time: self.time_direction_flagging.then_some(sensitivity),
            frequency: self.frequency_direction_flagging.then_some(sensitivity),
        };
        sum_threshold(&self.thresholds, &image, &mut mask, sensitivities)?;
        debug!(
            "sumthreshold at sensitivity {sensitivity:.3}: {} new flags",
            mask.count_flagged() - before
        );
        artifacts.contaminated_mut().set_global_mask(Arc::new(mask))
    }

    fn validate(&self) -> FlagResult<()> {
        if !(self.base_sensitivity > 0.0) {
            return Err(FlagError::invalid(format!(
                "sumthreshold sensitivity {} must be positive",
                self.base_sensitivity
            )));
        }
        if self.thresholds.max_length == 0 {
            return Err(FlagError::invalid("sumthreshold max length must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighPassMode {
    /// Store the smoothed background as the revised data.
    #[default]
    StoreRevised,
    /// Replace the contaminated image by its high-pass residual.
    StoreContaminated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPassFilterAction {
    pub filter: HighPassFilter,
    pub mode: HighPassMode,
}

impl FlagAction for HighPassFilterAction {
    fn description(&self) -> String {
        "High-pass filter".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let data = artifacts.contaminated();
        let image = Arc::clone(data.sole_image()?);
        let mask = data.single_mask();
        let mut pool = BufferPool::with_capacity(SCRATCH_BUFFERS);
        match self.mode {
            HighPassMode::StoreRevised => {
                let background = self.filter.low_pass(&image, &mask, &mut pool)?;
                let mut revised = data.clone();
                revised.set_image(0, Arc::new(background))?;
                artifacts.set_revised(revised);
            }
            HighPassMode::StoreContaminated => {
                let residual = self.filter.high_pass(&image, &mask, &mut pool)?;
                artifacts.contaminated_mut().set_image(0, Arc::new(residual))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        let f = &self.filter;
        if f.window_width == 0 || f.window_height == 0 {
            return Err(FlagError::invalid("high-pass windows must be at least one sample"));
        }
        if f.h_kernel_sigma_sq < 0.0 || f.v_kernel_sigma_sq < 0.0 {
            return Err(FlagError::invalid("high-pass kernel variances must not be negative"));
        }
        Ok(())
    }
}

/// Flags whole channels whose RMS is an outlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencySelectionAction {
    pub threshold: f64,
}

impl Default for FrequencySelectionAction {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

impl FlagAction for FrequencySelectionAction {
    fn description(&self) -> String {
        "Frequency selection".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let data = artifacts.contaminated();
        let image = data.single_image();
        let mut mask = data.single_mask();
        let flagged = flag_outlier_channels(&image, &mut mask, self.threshold)?;
        debug!("frequency selection flagged {flagged} channels");
        artifacts.contaminated_mut().set_global_mask(Arc::new(mask))
    }

    fn validate(&self) -> FlagResult<()> {
        check_threshold(self.threshold)
    }
}

/// Flags whole timesteps whose RMS is an outlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSelectionAction {
    pub threshold: f64,
}

impl Default for TimeSelectionAction {
    fn default() -> Self {
        Self { threshold: 3.5 }
    }
}

impl FlagAction for TimeSelectionAction {
    fn description(&self) -> String {
        "Time selection".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let data = artifacts.contaminated();
        let image = data.single_image();
        let mut mask = data.single_mask();
        let flagged = flag_outlier_timesteps(&image, &mut mask, self.threshold)?;
        debug!("time selection flagged {flagged} timesteps");
        artifacts.contaminated_mut().set_global_mask(Arc::new(mask))
    }

    fn validate(&self) -> FlagResult<()> {
        check_threshold(self.threshold)
    }
}

fn check_threshold(threshold: f64) -> FlagResult<()> {
    if threshold > 0.0 {
        Ok(())
    } else {
        Err(FlagError::invalid(format!("selection threshold {threshold} must be positive")))
    }
}

/// Divides the contaminated image by the median of each of `steps`
/// channel groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratePassbandAction {
    pub steps: usize,
}

impl Default for CalibratePassbandAction {
    fn default() -> Self {
        Self { steps: 48 }
    }
}

impl FlagAction for CalibratePassbandAction {
    fn description(&self) -> String {
        format!("Calibrate passband ({} steps)", self.steps)
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let mask = artifacts.contaminated().single_mask();
        let image = artifacts.contaminated_mut().sole_image_mut()?;
        calibrate_passband(image, &mask, self.steps)
    }

    fn validate(&self) -> FlagResult<()> {
        if self.steps == 0 {
            return Err(FlagError::invalid("passband calibration needs at least one step"));
        }
        Ok(())
    }
}

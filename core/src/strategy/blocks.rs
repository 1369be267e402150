//! Container actions that reshape how their children see the data.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::ArtifactSet;
use crate::prelude::{FlagError, FlagResult, ProgressListener};
use crate::strategy::action::{perform_children, validate_children, Action, FlagAction};

/// Runs its children `iteration_count` times with a decreasing sensitivity.
///
/// The outer sensitivity is multiplied by `sensitivity_start` on entry and
/// divided by `sensitivity_start^(1/iteration_count)` after every pass, so
/// thresholds relax towards their nominal value. The outer sensitivity is
/// restored on exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationBlock {
    pub iteration_count: usize,
    pub sensitivity_start: f64,
    pub children: Vec<Action>,
}

impl Default for IterationBlock {
    fn default() -> Self {
        Self::new(4)
    }
}

impl IterationBlock {
    /// Block of `iteration_count` passes starting at `2·2^(n/2)`.
    pub fn new(iteration_count: usize) -> Self {
        Self {
            iteration_count,
            sensitivity_start: Self::default_sensitivity_start(iteration_count),
            children: Vec::new(),
        }
    }

    pub fn default_sensitivity_start(iteration_count: usize) -> f64 {
        2.0 * 2f64.powf(iteration_count as f64 / 2.0)
    }

    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }

    /// Sensitivity multiplier seen by the children on every pass.
    pub fn schedule(&self) -> Vec<f64> {
        let step = self.sensitivity_start.powf(1.0 / self.iteration_count.max(1) as f64);
        std::iter::successors(Some(self.sensitivity_start), |s| Some(s / step))
            .take(self.iteration_count)
            .collect()
    }
}

impl FlagAction for IterationBlock {
    fn description(&self) -> String {
        format!("Iterate {} times", self.iteration_count)
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        let outer = artifacts.sensitivity();
        let mut outcome = Ok(());
        for (pass, factor) in self.schedule().into_iter().enumerate() {
            listener.on_progress(pass, self.iteration_count);
            artifacts.set_sensitivity(outer * factor);
            debug!("iteration {pass}: sensitivity {:.3}", outer * factor);
            outcome = perform_children(&self.children, artifacts, listener);
            if outcome.is_err() {
                break;
            }
        }
        artifacts.set_sensitivity(outer);
        outcome
    }

    fn validate(&self) -> FlagResult<()> {
        if self.iteration_count == 0 {
            return Err(FlagError::invalid("iteration count must be at least 1"));
        }
        if !(self.sensitivity_start > 0.0) {
            return Err(FlagError::invalid(format!(
                "iteration sensitivity start {} must be positive",
                self.sensitivity_start
            )));
        }
        validate_children(&self.children)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    #[default]
    Or,
    And,
}

/// Runs every child on the same input flags and merges their resulting
/// masks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineFlagResults {
    pub mode: CombineMode,
    pub children: Vec<Action>,
}

impl CombineFlagResults {
    pub fn new(children: Vec<Action>) -> Self {
        Self {
            mode: CombineMode::Or,
            children,
        }
    }
}

impl FlagAction for CombineFlagResults {
    fn description(&self) -> String {
        match self.mode {
            CombineMode::Or => "Combine flags (or)".into(),
            CombineMode::And => "Combine flags (and)".into(),
        }
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        if self.children.len() <= 1 {
            return perform_children(&self.children, artifacts, listener);
        }
        let input = artifacts.contaminated().clone();
        let mut combined: Option<_> = None;
        for (index, child) in self.children.iter().enumerate() {
            listener.on_start_task(index, self.children.len(), &child.description());
            artifacts.set_contaminated(input.clone());
            child.perform(artifacts, listener)?;
            listener.on_end_task();
            let result = artifacts.contaminated();
            match combined.as_mut() {
                None => combined = Some(result.clone()),
                Some(acc) => match self.mode {
                    CombineMode::Or => acc.join_mask(result)?,
                    CombineMode::And => acc.intersect_mask(result)?,
                },
            }
        }
        let mut output = input;
        if let Some(combined) = combined {
            output.copy_masks_from(&combined)?;
        }
        artifacts.set_contaminated(output);
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        validate_children(&self.children)
    }
}

/// Runs its children on a lower-resolution copy of the data.
///
/// Images are averaged and masks OR-reduced over `time_decrease_factor ×
/// frequency_decrease_factor` blocks. Afterwards the background the children
/// left in `revised` is enlarged back and subtracted from the full-resolution
/// contaminated data; with `restore_masks` the low-resolution flags are
/// enlarged and joined as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeResolutionAction {
    pub time_decrease_factor: usize,
    pub frequency_decrease_factor: usize,
    pub restore_revised: bool,
    pub restore_masks: bool,
    pub children: Vec<Action>,
}

impl Default for ChangeResolutionAction {
    fn default() -> Self {
        Self::new(3, 3)
    }
}

impl ChangeResolutionAction {
    pub fn new(time_decrease_factor: usize, frequency_decrease_factor: usize) -> Self {
        Self {
            time_decrease_factor,
            frequency_decrease_factor,
            restore_revised: true,
            restore_masks: false,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }
}

impl FlagAction for ChangeResolutionAction {
    fn description(&self) -> String {
        format!(
            "Change resolution (time /{}, frequency /{})",
            self.time_decrease_factor, self.frequency_decrease_factor
        )
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        let (width, height) = {
            let data = artifacts.contaminated();
            (data.width(), data.height())
        };
        // a factor beyond the axis would leave nothing to work on
        let time = self.time_decrease_factor.min(width).max(1);
        let frequency = self.frequency_decrease_factor.min(height).max(1);
        if time == 1 && frequency == 1 {
            return perform_children(&self.children, artifacts, listener);
        }
        debug!("resolution {width}x{height} reduced by {time}x{frequency}");

        let low_original = artifacts.original().shrink(time, frequency);
        let low_contaminated = artifacts.contaminated().shrink(time, frequency);
        let low_revised = artifacts.revised().shrink(time, frequency);
        let (original, contaminated, revised) =
            artifacts.replace_views(low_original, low_contaminated, low_revised);

        let outcome = perform_children(&self.children, artifacts, listener);
        let (_, low_contaminated, low_revised) =
            artifacts.replace_views(original, contaminated, revised);
        outcome?;

        if self.restore_revised {
            let mut revised = low_revised.enlarge(time, frequency, width, height);
            revised.copy_masks_from(artifacts.contaminated())?;
            let residual = artifacts.contaminated().difference(&revised)?;
            artifacts.set_revised(revised);
            artifacts.set_contaminated(residual);
        }
        if self.restore_masks {
            let enlarged = low_contaminated.enlarge(time, frequency, width, height);
            artifacts.contaminated_mut().join_mask(&enlarged)?;
        }
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        if self.time_decrease_factor == 0 || self.frequency_decrease_factor == 0 {
            return Err(FlagError::invalid("resolution decrease factors must be at least 1"));
        }
        validate_children(&self.children)
    }
}

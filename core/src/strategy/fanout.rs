//! Actions that fan their children out over polarizations, complex
//! components or baselines.
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::data::{ArtifactSet, Representation, TimeFrequencyData};
use crate::prelude::{FlagError, FlagResult, ProgressListener};
use crate::strategy::action::{perform_children, validate_children, Action, FlagAction};

/// Runs the children once per polarization, each time on views narrowed to
/// that polarization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForEachPolarisationBlock {
    pub children: Vec<Action>,
}

impl ForEachPolarisationBlock {
    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }
}

/// Narrow `data` to polarization `index` if it has `count` of them, else use
/// it whole.
fn narrow(data: &TimeFrequencyData, index: usize, count: usize) -> FlagResult<TimeFrequencyData> {
    if data.polarization_count() == count {
        data.polarization_data(index)
    } else {
        Ok(data.clone())
    }
}

/// Store the result of one polarization pass. If the children changed the
/// layout only the flags are kept.
fn store_polarization(
    target: &mut TimeFrequencyData,
    index: usize,
    result: &TimeFrequencyData,
) -> FlagResult<()> {
    if result.polarization_count() == 1 && result.representation() == target.representation() {
        target.set_polarization_data(index, result)
    } else {
        target.set_polarization_mask(index, Arc::new(result.single_mask()))
    }
}

impl FlagAction for ForEachPolarisationBlock {
    fn description(&self) -> String {
        "For each polarisation".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        let count = artifacts.contaminated().polarization_count();
        if count == 1 {
            return perform_children(&self.children, artifacts, listener);
        }
        let original = artifacts.original().clone();
        let mut contaminated = artifacts.contaminated().clone();
        let mut revised = artifacts.revised().clone();
        let polarizations = contaminated.polarizations();
        for (index, polarization) in polarizations.iter().enumerate() {
            listener.on_start_task(index, count, &format!("Polarisation {polarization:?}"));
            artifacts.replace_views(
                narrow(&original, index, count)?,
                contaminated.polarization_data(index)?,
                narrow(&revised, index, count)?,
            );
            perform_children(&self.children, artifacts, listener)?;
            store_polarization(&mut contaminated, index, artifacts.contaminated())?;
            if revised.polarization_count() == count {
                store_polarization(&mut revised, index, artifacts.revised())?;
            }
            listener.on_end_task();
        }
        artifacts.replace_views(original, contaminated, revised);
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        validate_children(&self.children)
    }
}

/// Runs the children on selected components of complex data. Non-complex
/// data is passed through to a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForEachComplexComponentAction {
    pub on_amplitude: bool,
    pub on_phase: bool,
    pub on_real: bool,
    pub on_imaginary: bool,
    /// After the amplitude pass, rescale the complex images to the amplitude
    /// the children produced.
    pub restore_from_amplitude: bool,
    pub children: Vec<Action>,
}

impl Default for ForEachComplexComponentAction {
    fn default() -> Self {
        Self {
            on_amplitude: true,
            on_phase: false,
            on_real: false,
            on_imaginary: false,
            restore_from_amplitude: false,
            children: Vec::new(),
        }
    }
}

impl ForEachComplexComponentAction {
    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }

    fn components(&self) -> Vec<Representation> {
        [
            (self.on_amplitude, Representation::Amplitude),
            (self.on_phase, Representation::Phase),
            (self.on_real, Representation::Real),
            (self.on_imaginary, Representation::Imaginary),
        ]
        .into_iter()
        .filter_map(|(selected, component)| selected.then_some(component))
        .collect()
    }
}

impl FlagAction for ForEachComplexComponentAction {
    fn description(&self) -> String {
        let names: Vec<String> = self.components().iter().map(|c| format!("{c:?}")).collect();
        format!("For each complex component ({})", names.join(", "))
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        if !artifacts.contaminated().is_complex() {
            return perform_children(&self.children, artifacts, listener);
        }
        let original = artifacts.original().clone();
        let mut contaminated = artifacts.contaminated().clone();
        let mut revised = artifacts.revised().clone();
        let components = self.components();
        for (index, &component) in components.iter().enumerate() {
            listener.on_start_task(index, components.len(), &format!("{component:?}"));
            artifacts.replace_views(
                original.make_representation(component)?,
                contaminated.make_representation(component)?,
                revised.make_representation(component)?,
            );
            perform_children(&self.children, artifacts, listener)?;
            contaminated.copy_masks_from(artifacts.contaminated())?;
            if component == Representation::Amplitude && self.restore_from_amplitude {
                contaminated.restore_from_amplitude(artifacts.contaminated())?;
                revised.restore_from_amplitude(artifacts.revised())?;
            }
            listener.on_end_task();
        }
        artifacts.replace_views(original, contaminated, revised);
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        if self.components().is_empty() {
            return Err(FlagError::invalid("no complex component selected"));
        }
        validate_children(&self.children)
    }
}

/// Runs the children on every baseline of the run's baseline source, each
/// in a fresh nested artifact set. Reads from the source are serialized
/// through the run's shared lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForEachBaselineAction {
    pub children: Vec<Action>,
}

impl ForEachBaselineAction {
    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }
}

impl FlagAction for ForEachBaselineAction {
    fn description(&self) -> String {
        "For each baseline".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        let source = artifacts
            .baseline_source()
            .cloned()
            .ok_or_else(|| FlagError::inconsistent("for-each-baseline requires a baseline source"))?;
        let count = artifacts.exclusive(|| source.baseline_count())?;
        info!("flagging {count} baselines");
        for index in 0..count {
            let baseline = artifacts.exclusive(|| source.read_baseline(index))??;
            let label = match baseline.baseline() {
                Some(b) => format!("Baseline {}x{}", b.antenna1, b.antenna2),
                None => format!("Baseline #{index}"),
            };
            listener.on_start_task(index, count, &label);
            let mut nested = artifacts.nested(baseline.data, baseline.metadata);
            perform_children(&self.children, &mut nested, listener)?;
            listener.on_end_task();
            debug!(
                "{label}: {} samples flagged",
                nested.contaminated().single_mask().count_flagged()
            );
        }
        Ok(())
    }

    fn validate(&self) -> FlagResult<()> {
        validate_children(&self.children)
    }
}

/// Hands the combined contaminated mask of the current baseline back to the
/// baseline source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteFlagsAction {}

impl FlagAction for WriteFlagsAction {
    fn description(&self) -> String {
        "Write flags".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let source = artifacts
            .baseline_source()
            .cloned()
            .ok_or_else(|| FlagError::inconsistent("writing flags requires a baseline source"))?;
        let baseline = artifacts
            .metadata()
            .baseline
            .ok_or_else(|| FlagError::inconsistent("writing flags requires baseline metadata"))?;
        let mask = artifacts.contaminated().single_mask();
        artifacts.exclusive(|| source.write_flags(baseline, &mask))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::buffers::Image2D;
    use crate::data::{Baseline, BaselineData, MemoryBaselineSource, TimeFrequencyMetadata};
    use crate::prelude::NullProgressListener;
    use crate::strategy::flagging::{FlaggingMode, SetFlaggingAction};

    fn complex(count: usize, re: f32, im: f32) -> TimeFrequencyData {
        let images = (0..count)
            .map(|i| Arc::new(Image2D::with_value(4, 4, if i % 2 == 0 { re } else { im })))
            .collect();
        TimeFrequencyData::from_image_count(images).unwrap()
    }

    #[test]
    fn polarisation_fanout_keeps_per_polarisation_flags() {
        let mut set = ArtifactSet::new(complex(4, 3.0, 4.0), Arc::new(Mutex::new(())));
        let mut block = ForEachPolarisationBlock::default();
        block.push(SetFlaggingAction::new(FlaggingMode::Everything));
        block.perform(&mut set, &NullProgressListener).unwrap();
        assert_eq!(set.contaminated().polarization_count(), 2);
        assert_eq!(set.contaminated().mask(1).unwrap().count_flagged(), 16);
        assert!(set.original().mask(0).is_none());
    }

    #[test]
    fn amplitude_pass_writes_masks_back_to_complex_data() {
        let mut set = ArtifactSet::new(complex(2, 3.0, 4.0), Arc::new(Mutex::new(())));
        let mut fan = ForEachComplexComponentAction::default();
        fan.push(SetFlaggingAction::new(FlaggingMode::Everything));
        fan.perform(&mut set, &NullProgressListener).unwrap();
        assert!(set.contaminated().is_complex());
        assert_eq!(set.contaminated().single_mask().count_flagged(), 16);
        assert_eq!(set.contaminated().image(1).unwrap().value(0, 0), 4.0);
    }

    #[test]
    fn non_complex_data_runs_once() {
        let data = TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(2, 2))]).unwrap();
        let mut set = ArtifactSet::new(data, Arc::new(Mutex::new(())));
        let mut fan = ForEachComplexComponentAction::default();
        fan.push(SetFlaggingAction::new(FlaggingMode::Everything));
        fan.perform(&mut set, &NullProgressListener).unwrap();
        assert_eq!(set.contaminated().single_mask().count_flagged(), 4);
    }

    #[test]
    fn baseline_fanout_writes_each_baseline() {
        let baselines = (0..3)
            .map(|a| BaselineData {
                data: TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(3, 2))]).unwrap(),
                metadata: TimeFrequencyMetadata {
                    baseline: Some(Baseline::new(a, a + 1)),
                    ..Default::default()
                },
            })
            .collect();
        let source = Arc::new(MemoryBaselineSource::new(baselines));
        let data = TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(1, 1))]).unwrap();
        let mut set = ArtifactSet::new(data, Arc::new(Mutex::new(())))
            .with_baseline_source(Arc::clone(&source) as Arc<dyn crate::data::BaselineSource>);

        let mut fan = ForEachBaselineAction::default();
        fan.push(SetFlaggingAction::new(FlaggingMode::Everything));
        fan.push(WriteFlagsAction::default());
        fan.perform(&mut set, &NullProgressListener).unwrap();

        let written = source.take_flags().unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|(_, mask)| mask.count_flagged() == 6));
    }

    #[test]
    fn baseline_fanout_without_source_fails() {
        let data = TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(1, 1))]).unwrap();
        let mut set = ArtifactSet::new(data, Arc::new(Mutex::new(())));
        let err = ForEachBaselineAction::default()
            .perform(&mut set, &NullProgressListener)
            .unwrap_err();
        assert!(matches!(err, FlagError::InconsistentState(_)));
    }
}

//! Actions that move flags and images between the artifact views.
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::ArtifactSet;
use crate::prelude::{FlagError, FlagResult, ProgressListener};
use crate::processing::{dilate_flags, sir};
use crate::strategy::action::FlagAction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlaggingMode {
    /// Clear every flag of the contaminated data.
    #[default]
    None,
    Everything,
    /// Replace the contaminated masks by the original ones.
    FromOriginal,
    /// Store the contaminated masks into the original data.
    ToOriginal,
    Invert,
    /// Give every polarization the OR of all polarization masks.
    PolarisationsEqual,
    /// Flag samples that are exactly zero in every image of a polarization.
    FlagZeros,
    /// OR the original masks into the contaminated ones.
    OrOriginal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetFlaggingAction {
    pub new_flagging: FlaggingMode,
}

impl SetFlaggingAction {
    pub fn new(new_flagging: FlaggingMode) -> Self {
        Self { new_flagging }
    }
}

impl FlagAction for SetFlaggingAction {
    fn description(&self) -> String {
        format!("Set flagging ({:?})", self.new_flagging)
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        match self.new_flagging {
            FlaggingMode::None => artifacts.contaminated_mut().set_masks_to_value(false),
            FlaggingMode::Everything => artifacts.contaminated_mut().set_masks_to_value(true),
            FlaggingMode::FromOriginal => {
                let original = artifacts.original().clone();
                artifacts.contaminated_mut().copy_masks_from(&original)?;
            }
            FlaggingMode::ToOriginal => {
                let contaminated = artifacts.contaminated().clone();
                artifacts.original_mut().copy_masks_from(&contaminated)?;
            }
            FlaggingMode::Invert => {
                let data = artifacts.contaminated_mut();
                for polarization in 0..data.polarization_count() {
                    data.mask_mut(polarization)?.invert();
                }
            }
            FlaggingMode::PolarisationsEqual => {
                let data = artifacts.contaminated_mut();
                let combined = Arc::new(data.single_mask());
                data.set_global_mask(combined)?;
            }
            FlaggingMode::FlagZeros => flag_zeros(artifacts)?,
            FlaggingMode::OrOriginal => {
                let original = artifacts.original().clone();
                artifacts.contaminated_mut().join_mask(&original)?;
            }
        }
        Ok(())
    }
}

fn flag_zeros(artifacts: &mut ArtifactSet) -> FlagResult<()> {
    let data = artifacts.contaminated_mut();
    let per = data.representation().images_per_polarization();
    for polarization in 0..data.polarization_count() {
        let images: Vec<_> = (0..per)
            .map(|k| data.image(polarization * per + k).map(Arc::clone))
            .collect::<FlagResult<_>>()?;
        let mask = data.mask_mut(polarization)?;
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                if images.iter().all(|image| image.value(x, y) == 0.0) {
                    mask.set_value(x, y, true);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    Zero,
    /// Contaminated images become the original images; masks are kept.
    #[default]
    FromOriginal,
    FromRevised,
    ContaminatedToOriginal,
    SwapRevisedAndContaminated,
    /// Flagged contaminated samples take the revised value.
    ReplaceFlaggedValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetImageAction {
    pub new_image: ImageMode,
}

impl SetImageAction {
    pub fn new(new_image: ImageMode) -> Self {
        Self { new_image }
    }
}

impl FlagAction for SetImageAction {
    fn description(&self) -> String {
        format!("Set image ({:?})", self.new_image)
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        match self.new_image {
            ImageMode::Zero => {
                let zero = artifacts.contaminated().zeroed_like();
                artifacts.set_contaminated(zero);
            }
            ImageMode::FromOriginal => {
                let original = artifacts.original().clone();
                artifacts.contaminated_mut().set_images_from(&original)?;
            }
            ImageMode::FromRevised => {
                let revised = artifacts.revised().clone();
                artifacts.contaminated_mut().set_images_from(&revised)?;
            }
            ImageMode::ContaminatedToOriginal => {
                let contaminated = artifacts.contaminated().clone();
                artifacts.original_mut().set_images_from(&contaminated)?;
            }
            ImageMode::SwapRevisedAndContaminated => {
                let contaminated = artifacts.contaminated().clone();
                let revised = artifacts.revised().clone();
                artifacts.contaminated_mut().set_images_from(&revised)?;
                artifacts.revised_mut().set_images_from(&contaminated)?;
            }
            ImageMode::ReplaceFlaggedValues => {
                let mask = artifacts.contaminated().single_mask();
                let revised = Arc::clone(artifacts.revised().sole_image()?);
                let image = artifacts.contaminated_mut().sole_image_mut()?;
                if !revised.same_dimensions(image) {
                    return Err(FlagError::inconsistent(format!(
                        "replacing flagged values: revised image is {}x{} but contaminated is {}x{}",
                        revised.width(),
                        revised.height(),
                        image.width(),
                        image.height()
                    )));
                }
                for y in 0..image.height() {
                    let (row, flags, replacement) = (image.row_mut(y), mask.row(y), revised.row(y));
                    for x in 0..row.len() {
                        if flags[x] {
                            row[x] = replacement[x];
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Morphological cleanup: optional dilation followed by the scale-invariant
/// rank operator along time then frequency. The result replaces the masks of
/// every polarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalFlagAction {
    pub enlarge_time_size: usize,
    pub enlarge_frequency_size: usize,
    pub minimum_good_time_ratio: f64,
    pub minimum_good_frequency_ratio: f64,
}

impl Default for StatisticalFlagAction {
    fn default() -> Self {
        Self {
            enlarge_time_size: 0,
            enlarge_frequency_size: 0,
            minimum_good_time_ratio: 0.2,
            minimum_good_frequency_ratio: 0.2,
        }
    }
}

impl FlagAction for StatisticalFlagAction {
    fn description(&self) -> String {
        "Statistical flagging".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        let mut mask = artifacts.contaminated().single_mask();
        let before = mask.count_flagged();
        dilate_flags(&mut mask, self.enlarge_time_size, self.enlarge_frequency_size);
        sir::operate_horizontally(&mut mask, self.minimum_good_time_ratio);
        sir::operate_vertically(&mut mask, self.minimum_good_frequency_ratio);
        debug!("statistical flagging: {} -> {} flags", before, mask.count_flagged());
        artifacts.contaminated_mut().set_global_mask(Arc::new(mask))
    }

    fn validate(&self) -> FlagResult<()> {
        let ratios = [self.minimum_good_time_ratio, self.minimum_good_frequency_ratio];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(FlagError::invalid(format!(
                "good-sample ratios {ratios:?} must lie in [0, 1]"
            )));
        }
        Ok(())
    }
}

//! Flagging of whole baselines whose flag occupancy stands out from the rest.
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::buffers::Mask2D;
use crate::data::{ArtifactSet, BaselineRecord};
use crate::math::StatsHelper;
use crate::prelude::{FlagError, FlagResult, ProgressListener};
use crate::strategy::action::FlagAction;

/// Two-phase baseline selection.
///
/// The preparation step runs inside the per-baseline block and records the
/// flag statistics of the current baseline. The final step runs once after
/// the fan-out, picks the outlying baselines and writes a fully flagged mask
/// for each of them to the baseline source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSelectionAction {
    pub preparation_step: bool,
    pub flag_bad_baselines: bool,
    /// Standard deviations above the mean flagged ratio of the other
    /// baselines at which a baseline is an outlier.
    pub threshold: f64,
    /// Flagged ratio above which a baseline is always bad.
    pub absolute_threshold: f64,
    /// Lower bound on the spread used with `threshold`.
    pub minimum_spread: f64,
}

impl Default for BaselineSelectionAction {
    fn default() -> Self {
        Self {
            preparation_step: true,
            flag_bad_baselines: true,
            threshold: 8.0,
            absolute_threshold: 0.4,
            minimum_spread: 0.01,
        }
    }
}

impl BaselineSelectionAction {
    pub fn preparation() -> Self {
        Self::default()
    }

    pub fn selection() -> Self {
        Self {
            preparation_step: false,
            ..Self::default()
        }
    }

    fn prepare(&self, artifacts: &ArtifactSet) -> FlagResult<()> {
        let Some(baseline) = artifacts.metadata().baseline else {
            debug!("no baseline metadata, nothing recorded for baseline selection");
            return Ok(());
        };
        if baseline.is_auto_correlation() {
            return Ok(());
        }
        let mask = artifacts.contaminated().single_mask();
        let image = artifacts.original().single_image();
        artifacts.record_baseline(BaselineRecord::measure(baseline, &image, &mask)?)
    }

    /// Baselines judged bad among `records`, in baseline order.
    pub fn select(&self, records: &[BaselineRecord]) -> Vec<BaselineRecord> {
        let (mut bad, mut remaining): (Vec<_>, Vec<_>) = records
            .iter()
            .copied()
            .partition(|r| r.flagged_ratio() > self.absolute_threshold);
        while remaining.len() > 1 {
            let Some(worst) = remaining
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.flagged_ratio().total_cmp(&b.1.flagged_ratio()))
                .map(|(index, _)| index)
            else {
                break;
            };
            let others: Vec<f64> = remaining
                .iter()
                .enumerate()
                .filter(|&(index, _)| index != worst)
                .map(|(_, r)| r.flagged_ratio())
                .collect();
            let (mean, stddev) = StatsHelper::mean_and_stddev(&others);
            let limit = mean + self.threshold * stddev.max(self.minimum_spread);
            if remaining[worst].flagged_ratio() > limit {
                bad.push(remaining.swap_remove(worst));
            } else {
                break;
            }
        }
        bad.sort_by_key(|r| r.baseline);
        bad
    }

    fn flag_selected(&self, artifacts: &ArtifactSet) -> FlagResult<()> {
        let records = artifacts.take_baseline_records()?;
        let bad = self.select(&records);
        info!(
            "baseline selection: {} of {} baselines are bad",
            bad.len(),
            records.len()
        );
        for record in &bad {
            debug!(
                "bad baseline {}x{}: {:.1}% flagged, rms {:.3}",
                record.baseline.antenna1,
                record.baseline.antenna2,
                100.0 * record.flagged_ratio(),
                record.rms
            );
        }
        if !self.flag_bad_baselines || bad.is_empty() {
            return Ok(());
        }
        let source = artifacts
            .baseline_source()
            .cloned()
            .ok_or_else(|| FlagError::inconsistent("flagging bad baselines requires a baseline source"))?;
        for record in bad {
            let mask = Mask2D::with_value(record.width, record.height, true);
            artifacts.exclusive(|| source.write_flags(record.baseline, &mask))??;
        }
        Ok(())
    }
}

impl FlagAction for BaselineSelectionAction {
    fn description(&self) -> String {
        if self.preparation_step {
            "Baseline selection (preparation)".into()
        } else {
            "Baseline selection".into()
        }
    }

    fn perform(&self, artifacts: &mut ArtifactSet, _listener: &dyn ProgressListener) -> FlagResult<()> {
        if self.preparation_step {
            self.prepare(artifacts)
        } else {
            self.flag_selected(artifacts)
        }
    }

    fn validate(&self) -> FlagResult<()> {
        if !(self.threshold > 0.0) || !(self.minimum_spread >= 0.0) {
            return Err(FlagError::invalid(format!(
                "baseline selection threshold {} and spread {} must be positive",
                self.threshold, self.minimum_spread
            )));
        }
        if !(0.0..=1.0).contains(&self.absolute_threshold) {
            return Err(FlagError::invalid(format!(
                "absolute baseline threshold {} outside [0, 1]",
                self.absolute_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::buffers::Image2D;
    use crate::data::{
        Baseline, BaselineData, BaselineSource, MemoryBaselineSource, TimeFrequencyData,
        TimeFrequencyMetadata,
    };
    use crate::prelude::NullProgressListener;
    use crate::strategy::action::ActionBlock;
    use crate::strategy::fanout::{ForEachBaselineAction, WriteFlagsAction};
    use crate::strategy::flagging::{FlaggingMode, SetFlaggingAction};

    fn record(antenna2: usize, flagged: usize) -> BaselineRecord {
        BaselineRecord {
            baseline: Baseline::new(0, antenna2),
            width: 10,
            height: 10,
            flagged,
            rms: 1.0,
        }
    }

    #[test]
    fn outliers_and_heavily_flagged_baselines_are_selected() {
        let mut records: Vec<BaselineRecord> = (1..=10).map(|a| record(a, 2)).collect();
        records[3] = record(4, 30);
        records[7] = record(8, 50);
        let bad = BaselineSelectionAction::selection().select(&records);
        let bad: Vec<Baseline> = bad.iter().map(|r| r.baseline).collect();
        assert_eq!(bad, vec![Baseline::new(0, 4), Baseline::new(0, 8)]);
    }

    #[test]
    fn uniform_baselines_are_all_kept() {
        let records: Vec<BaselineRecord> = (1..=6).map(|a| record(a, 5 + a % 2)).collect();
        assert!(BaselineSelectionAction::selection().select(&records).is_empty());
        assert_eq!(BaselineSelectionAction::selection().select(&[record(1, 99)]).len(), 1);
    }

    fn baseline(antenna2: usize, zero_rows: usize) -> BaselineData {
        let mut image = Image2D::with_value(8, 8, 1.0);
        for y in 0..zero_rows {
            image.row_mut(y).fill(0.0);
        }
        BaselineData {
            data: TimeFrequencyData::from_image_count(vec![Arc::new(image)]).unwrap(),
            metadata: TimeFrequencyMetadata {
                baseline: Some(Baseline::new(0, antenna2)),
                ..Default::default()
            },
        }
    }

    #[test]
    fn bad_baseline_among_good_ones_is_fully_flagged() {
        let source = Arc::new(MemoryBaselineSource::new(vec![
            baseline(1, 0),
            baseline(2, 4),
            baseline(3, 0),
            baseline(4, 0),
        ]));
        let placeholder =
            TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::new(1, 1))]).unwrap();
        let mut artifacts = ArtifactSet::new(placeholder, Arc::new(Mutex::new(())))
            .with_baseline_source(Arc::clone(&source) as Arc<dyn BaselineSource>);

        let mut per_baseline = ForEachBaselineAction::default();
        per_baseline.push(SetFlaggingAction::new(FlaggingMode::FlagZeros));
        per_baseline.push(BaselineSelectionAction::preparation());
        per_baseline.push(WriteFlagsAction::default());
        let mut root = ActionBlock::new();
        root.push(per_baseline);
        root.push(BaselineSelectionAction::selection());
        root.perform(&mut artifacts, &NullProgressListener).unwrap();

        let written = source.take_flags().unwrap();
        assert_eq!(written.len(), 5);
        let (last_baseline, last_mask) = &written[4];
        assert_eq!(*last_baseline, Baseline::new(0, 2));
        assert_eq!(last_mask.count_flagged(), 64);
        assert_eq!(written[1].1.count_flagged(), 32);
        assert!(artifacts.take_baseline_records().unwrap().is_empty());
    }

    #[test]
    fn runs_without_baseline_metadata_record_nothing() {
        let data = TimeFrequencyData::from_image_count(vec![Arc::new(Image2D::with_value(4, 4, 1.0))])
            .unwrap();
        let mut artifacts = ArtifactSet::new(data, Arc::new(Mutex::new(())));
        BaselineSelectionAction::preparation()
            .perform(&mut artifacts, &NullProgressListener)
            .unwrap();
        assert!(artifacts.take_baseline_records().unwrap().is_empty());
    }

    #[test]
    fn out_of_range_thresholds_fail_validation() {
        let action = BaselineSelectionAction {
            absolute_threshold: 1.5,
            ..BaselineSelectionAction::selection()
        };
        assert!(action.validate().is_err());
        let action = BaselineSelectionAction {
            threshold: 0.0,
            ..BaselineSelectionAction::selection()
        };
        assert!(action.validate().is_err());
        assert!(BaselineSelectionAction::default().validate().is_ok());
    }
}

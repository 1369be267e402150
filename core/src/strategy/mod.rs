//! Action trees and the strategies built from them.
pub mod action;
pub mod baseline_selection;
pub mod blocks;
pub mod default;
pub mod detection;
pub mod fanout;
pub mod flagging;
pub mod io;

use serde::{Deserialize, Serialize};

use crate::data::ArtifactSet;
use crate::prelude::{FlagResult, ProgressListener};

pub use action::{Action, ActionBlock, FlagAction};
pub use baseline_selection::BaselineSelectionAction;
pub use blocks::{ChangeResolutionAction, CombineFlagResults, CombineMode, IterationBlock};
pub use default::{build_baseline_strategy, build_strategy, StrategyFlags, StrategyOptions};
pub use detection::{
    CalibratePassbandAction, FrequencySelectionAction, HighPassFilterAction, HighPassMode,
    SumThresholdAction, TimeSelectionAction,
};
pub use fanout::{
    ForEachBaselineAction, ForEachComplexComponentAction, ForEachPolarisationBlock, WriteFlagsAction,
};
pub use flagging::{FlaggingMode, ImageMode, SetFlaggingAction, SetImageAction, StatisticalFlagAction};
pub use io::{load_strategy, save_strategy, STRATEGY_FORMAT_VERSION};

/// Immutable action tree. Executing it never mutates the strategy, so one
/// instance can be shared by concurrent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    root: ActionBlock,
}

impl Strategy {
    pub fn new(root: ActionBlock) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ActionBlock {
        &self.root
    }

    pub fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        self.root.perform(artifacts, listener)
    }

    pub fn validate(&self) -> FlagResult<()> {
        self.root.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn strategies_can_be_shared_between_threads() {
        assert_send_sync::<Strategy>();
    }

    #[test]
    fn empty_strategy_is_valid() {
        assert!(Strategy::new(ActionBlock::new()).validate().is_ok());
    }
}

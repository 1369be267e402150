//! Action contract and the closed set of node kinds a strategy is built from.
use serde::{Deserialize, Serialize};

use crate::data::ArtifactSet;
use crate::strategy::baseline_selection::BaselineSelectionAction;
use crate::prelude::{FlagResult, ProgressListener};
use crate::strategy::blocks::{ChangeResolutionAction, CombineFlagResults, IterationBlock};
use crate::strategy::detection::{
    CalibratePassbandAction, FrequencySelectionAction, HighPassFilterAction, SumThresholdAction,
    TimeSelectionAction,
};
use crate::strategy::fanout::{
    ForEachBaselineAction, ForEachComplexComponentAction, ForEachPolarisationBlock, WriteFlagsAction,
};
use crate::strategy::flagging::{SetFlaggingAction, SetImageAction, StatisticalFlagAction};

/// A step of a flagging strategy.
///
/// `perform` must only communicate through `artifacts`: the same action is
/// executed concurrently against many artifact sets.
pub trait FlagAction {
    fn description(&self) -> String;

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()>;

    /// Check parameters, recursing into children.
    fn validate(&self) -> FlagResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Block(ActionBlock),
    Iteration(IterationBlock),
    ForEachPolarisation(ForEachPolarisationBlock),
    ForEachComplexComponent(ForEachComplexComponentAction),
    ForEachBaseline(ForEachBaselineAction),
    CombineFlagResults(CombineFlagResults),
    ChangeResolution(ChangeResolutionAction),
    SumThreshold(SumThresholdAction),
    HighPassFilter(HighPassFilterAction),
    StatisticalFlag(StatisticalFlagAction),
    SetFlagging(SetFlaggingAction),
    SetImage(SetImageAction),
    FrequencySelection(FrequencySelectionAction),
    TimeSelection(TimeSelectionAction),
    CalibratePassband(CalibratePassbandAction),
    WriteFlags(WriteFlagsAction),
    BaselineSelection(BaselineSelectionAction),
}

macro_rules! dispatch {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            Action::Block($node) => $body,
            Action::Iteration($node) => $body,
            Action::ForEachPolarisation($node) => $body,
            Action::ForEachComplexComponent($node) => $body,
            Action::ForEachBaseline($node) => $body,
            Action::CombineFlagResults($node) => $body,
            Action::ChangeResolution($node) => $body,
            Action::SumThreshold($node) => $body,
            Action::HighPassFilter($node) => $body,
            Action::StatisticalFlag($node) => $body,
            Action::SetFlagging($node) => $body,
            Action::SetImage($node) => $body,
            Action::FrequencySelection($node) => $body,
            Action::TimeSelection($node) => $body,
            Action::CalibratePassband($node) => $body,
            Action::WriteFlags($node) => $body,
            Action::BaselineSelection($node) => $body,
        }
    };
}

impl FlagAction for Action {
    fn description(&self) -> String {
        dispatch!(self, node => node.description())
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        dispatch!(self, node => node.perform(artifacts, listener))
    }

    fn validate(&self) -> FlagResult<()> {
        dispatch!(self, node => node.validate())
    }
}

macro_rules! into_action {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Action {
                fn from(node: $ty) -> Self {
                    Action::$variant(node)
                }
            }
        )*
    };
}

into_action!(
    Block(ActionBlock),
    Iteration(IterationBlock),
    ForEachPolarisation(ForEachPolarisationBlock),
    ForEachComplexComponent(ForEachComplexComponentAction),
    ForEachBaseline(ForEachBaselineAction),
    CombineFlagResults(CombineFlagResults),
    ChangeResolution(ChangeResolutionAction),
    SumThreshold(SumThresholdAction),
    HighPassFilter(HighPassFilterAction),
    StatisticalFlag(StatisticalFlagAction),
    SetFlagging(SetFlaggingAction),
    SetImage(SetImageAction),
    FrequencySelection(FrequencySelectionAction),
    TimeSelection(TimeSelectionAction),
    CalibratePassband(CalibratePassbandAction),
    WriteFlags(WriteFlagsAction),
    BaselineSelection(BaselineSelectionAction),
);

/// Run `children` in order, reporting each one to `listener`.
pub fn perform_children(
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> FlagResult<()> {
    for (index, child) in children.iter().enumerate() {
        listener.on_start_task(index, children.len(), &child.description());
        child.perform(artifacts, listener)?;
        listener.on_end_task();
    }
    Ok(())
}

pub fn validate_children(children: &[Action]) -> FlagResult<()> {
    children.iter().try_for_each(FlagAction::validate)
}

/// Plain sequence of actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionBlock {
    pub children: Vec<Action>,
}

impl ActionBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: Vec<Action>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, action: impl Into<Action>) {
        self.children.push(action.into());
    }
}

impl FlagAction for ActionBlock {
    fn description(&self) -> String {
        "Block".into()
    }

    fn perform(&self, artifacts: &mut ArtifactSet, listener: &dyn ProgressListener) -> FlagResult<()> {
        perform_children(&self.children, artifacts, listener)
    }

    fn validate(&self) -> FlagResult<()> {
        validate_children(&self.children)
    }
}

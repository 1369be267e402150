//! Construction of the built-in flagging strategy.
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::data::TelescopeId;
use crate::processing::HighPassFilter;
use crate::strategy::action::ActionBlock;
use crate::strategy::baseline_selection::BaselineSelectionAction;
use crate::strategy::blocks::{ChangeResolutionAction, CombineFlagResults, IterationBlock};
use crate::strategy::detection::{
    CalibratePassbandAction, FrequencySelectionAction, HighPassFilterAction, HighPassMode,
    SumThresholdAction, TimeSelectionAction,
};
use crate::strategy::fanout::{
    ForEachBaselineAction, ForEachComplexComponentAction, ForEachPolarisationBlock, WriteFlagsAction,
};
use crate::strategy::flagging::{
    FlaggingMode, ImageMode, SetFlaggingAction, SetImageAction, StatisticalFlagAction,
};
use crate::strategy::Strategy;

/// Hints that tune the default strategy. Bits without a meaning are kept
/// and ignored.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyFlags(u32);

impl StrategyFlags {
    pub const NONE: Self = Self(0x00);
    pub const LOW_FREQUENCY: Self = Self(0x01);
    pub const HIGH_FREQUENCY: Self = Self(0x02);
    pub const TRANSIENTS: Self = Self(0x04);
    pub const ROBUST: Self = Self(0x08);
    pub const FAST: Self = Self(0x10);
    pub const OFF_AXIS_SOURCES: Self = Self(0x20);
    pub const UNSENSITIVE: Self = Self(0x40);
    pub const SENSITIVE: Self = Self(0x80);
    pub const GUI_FRIENDLY: Self = Self(0x100);
    pub const CLEAR_FLAGS: Self = Self(0x200);
    pub const LARGE_BANDWIDTH: Self = Self(0x400);
    pub const SMALL_BANDWIDTH: Self = Self(0x800);
    pub const AUTO_CORRELATION: Self = Self(0x1000);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StrategyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StrategyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StrategyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrategyFlags({:#x})", self.0)
    }
}

/// Inputs of the default strategy builder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    pub telescope: TelescopeId,
    pub flags: StrategyFlags,
    /// Observing frequency in Hz, 0 when unknown.
    pub frequency: f64,
    /// Seconds per timestep, 0 when unknown.
    pub time_resolution: f64,
    /// Hz per channel, 0 when unknown.
    pub frequency_resolution: f64,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            telescope: TelescopeId::Generic,
            flags: StrategyFlags::NONE,
            frequency: 0.0,
            time_resolution: 0.0,
            frequency_resolution: 0.0,
        }
    }
}

impl StrategyOptions {
    pub fn new(telescope: TelescopeId, flags: StrategyFlags) -> Self {
        Self {
            telescope,
            flags,
            ..Self::default()
        }
    }

    fn base_sensitivity(&self) -> f64 {
        let mut sensitivity = 1.0;
        if self.flags.contains(StrategyFlags::UNSENSITIVE) {
            sensitivity *= 1.2;
        }
        if self.flags.contains(StrategyFlags::SENSITIVE) {
            sensitivity *= 0.8;
        }
        sensitivity
    }

    fn calibrate_passband(&self) -> bool {
        (self.telescope == TelescopeId::Mwa && !self.flags.contains(StrategyFlags::SMALL_BANDWIDTH))
            || self.flags.contains(StrategyFlags::LARGE_BANDWIDTH)
    }
}

/// Default strategy for a single baseline.
pub fn build_strategy(options: &StrategyOptions) -> Strategy {
    Strategy::new(build_single_baseline_block(options))
}

/// Default strategy for a whole observation: the single-baseline block run
/// for every baseline of the run's baseline source, each followed by
/// writing its flags back, then the selection of bad baselines.
pub fn build_baseline_strategy(options: &StrategyOptions) -> Strategy {
    let mut per_baseline = ForEachBaselineAction::default();
    per_baseline.children = build_single_baseline_block(options).children;
    per_baseline.push(WriteFlagsAction::default());
    Strategy::new(ActionBlock::with_children(vec![
        per_baseline.into(),
        BaselineSelectionAction::selection().into(),
    ]))
}

fn build_single_baseline_block(options: &StrategyOptions) -> ActionBlock {
    let flags = options.flags;
    let transients = flags.contains(StrategyFlags::TRANSIENTS);
    let mut root = ActionBlock::new();

    if flags.contains(StrategyFlags::GUI_FRIENDLY) {
        root.push(SetImageAction::new(ImageMode::FromOriginal));
    }
    root.push(SetFlaggingAction::new(FlaggingMode::None));

    let mut per_polarisation = ForEachPolarisationBlock::default();
    per_polarisation.push(amplitude_block(options));
    root.push(per_polarisation);

    root.push(SetFlaggingAction::new(FlaggingMode::PolarisationsEqual));
    root.push(StatisticalFlagAction::default());
    if !transients {
        root.push(TimeSelectionAction::default());
    }
    root.push(BaselineSelectionAction::preparation());
    if !flags.contains(StrategyFlags::CLEAR_FLAGS) && !flags.contains(StrategyFlags::GUI_FRIENDLY) {
        root.push(SetFlaggingAction::new(FlaggingMode::OrOriginal));
    }
    root
}

fn amplitude_block(options: &StrategyOptions) -> ForEachComplexComponentAction {
    let flags = options.flags;
    let transients = flags.contains(StrategyFlags::TRANSIENTS);
    let sensitivity = options.base_sensitivity();
    let iteration_count = if flags.contains(StrategyFlags::ROBUST) { 4 } else { 2 };

    let mut iteration = IterationBlock::new(iteration_count);
    iteration.push(SumThresholdAction {
        frequency_direction_flagging: !transients,
        ..SumThresholdAction::with_sensitivity(sensitivity)
    });

    let mut selection = CombineFlagResults::new(vec![FrequencySelectionAction::default().into()]);
    if !transients {
        selection.children.push(TimeSelectionAction::default().into());
    }
    iteration.push(selection);
    iteration.push(SetImageAction::new(ImageMode::FromOriginal));

    let mut resolution = ChangeResolutionAction::new(if transients { 1 } else { 3 }, 3);
    resolution.push(HighPassFilterAction {
        filter: HighPassFilter {
            window_width: if transients { 1 } else { 21 },
            window_height: 31,
            h_kernel_sigma_sq: 2.5,
            v_kernel_sigma_sq: 5.0,
        },
        mode: HighPassMode::StoreRevised,
    });
    iteration.push(resolution);

    let mut component = ForEachComplexComponentAction::default();
    component.push(iteration);
    if options.calibrate_passband() {
        component.push(CalibratePassbandAction::default());
    }
    component.push(SumThresholdAction {
        frequency_direction_flagging: !transients,
        ..SumThresholdAction::with_sensitivity(sensitivity)
    });
    component
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::action::{Action, FlagAction};

    fn kinds(block: &[Action]) -> Vec<String> {
        block
            .iter()
            .map(|a| {
                let json = serde_json::to_value(a).unwrap();
                json["action"].as_str().unwrap().to_owned()
            })
            .collect()
    }

    fn component(strategy: &Strategy) -> &ForEachComplexComponentAction {
        let per_pol = strategy
            .root()
            .children
            .iter()
            .find_map(|a| match a {
                Action::ForEachPolarisation(block) => Some(block),
                _ => None,
            })
            .unwrap();
        match &per_pol.children[0] {
            Action::ForEachComplexComponent(component) => component,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flags_combine_and_test() {
        let flags = StrategyFlags::ROBUST | StrategyFlags::TRANSIENTS;
        assert!(flags.contains(StrategyFlags::ROBUST));
        assert!(!flags.contains(StrategyFlags::FAST));
        assert_eq!(flags.bits(), 0x0c);
        assert_eq!(StrategyFlags::from_bits(0x8000_0000).bits(), 0x8000_0000);
    }

    #[test]
    fn generic_strategy_layout() {
        let strategy = build_strategy(&StrategyOptions::default());
        assert_eq!(
            kinds(&strategy.root().children),
            vec![
                "set_flagging",
                "for_each_polarisation",
                "set_flagging",
                "statistical_flag",
                "time_selection",
                "baseline_selection",
                "set_flagging",
            ]
        );
        let component = component(&strategy);
        assert_eq!(kinds(&component.children), vec!["iteration", "sum_threshold"]);
        match &component.children[0] {
            Action::Iteration(block) => {
                assert_eq!(block.iteration_count, 2);
                assert_eq!(block.sensitivity_start, 4.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        strategy.validate().unwrap();
    }

    #[test]
    fn transients_drop_time_direction_work() {
        let strategy = build_strategy(&StrategyOptions::new(TelescopeId::Generic, StrategyFlags::TRANSIENTS));
        assert!(!kinds(&strategy.root().children).contains(&"time_selection".to_owned()));
        match &component(&strategy).children[1] {
            Action::SumThreshold(action) => assert!(!action.frequency_direction_flagging),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mwa_calibrates_passband_unless_small_bandwidth() {
        let mwa = build_strategy(&StrategyOptions::new(TelescopeId::Mwa, StrategyFlags::NONE));
        assert_eq!(
            kinds(&component(&mwa).children),
            vec!["iteration", "calibrate_passband", "sum_threshold"]
        );
        let narrow = build_strategy(&StrategyOptions::new(TelescopeId::Mwa, StrategyFlags::SMALL_BANDWIDTH));
        assert_eq!(kinds(&component(&narrow).children).len(), 2);
        let wide = build_strategy(&StrategyOptions::new(TelescopeId::Lofar, StrategyFlags::LARGE_BANDWIDTH));
        assert_eq!(kinds(&component(&wide).children).len(), 3);
    }

    #[test]
    fn gui_friendly_and_clear_flags_skip_or_original() {
        for flags in [StrategyFlags::GUI_FRIENDLY, StrategyFlags::CLEAR_FLAGS] {
            let strategy = build_strategy(&StrategyOptions::new(TelescopeId::Wsrt, flags));
            let last = strategy.root().children.last().unwrap();
            assert!(!matches!(
                last,
                Action::SetFlagging(SetFlaggingAction { new_flagging: FlaggingMode::OrOriginal })
            ));
        }
        let gui = build_strategy(&StrategyOptions::new(TelescopeId::Generic, StrategyFlags::GUI_FRIENDLY));
        assert_eq!(kinds(&gui.root().children)[0], "set_image");
    }

    #[test]
    fn sensitivity_hints_compound() {
        let options = StrategyOptions::new(
            TelescopeId::Generic,
            StrategyFlags::UNSENSITIVE | StrategyFlags::SENSITIVE,
        );
        assert!((options.base_sensitivity() - 0.96).abs() < 1e-12);
        let strategy = build_strategy(&options);
        match &component(&strategy).children[1] {
            Action::SumThreshold(action) => assert!((action.base_sensitivity - 0.96).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn baseline_strategy_ends_with_write_flags_and_selection() {
        let strategy = build_baseline_strategy(&StrategyOptions::default());
        match &strategy.root().children[..] {
            [Action::ForEachBaseline(block), Action::BaselineSelection(selection)] => {
                assert!(matches!(block.children.last(), Some(Action::WriteFlags(_))));
                assert!(block.children.iter().any(|a| matches!(
                    a,
                    Action::BaselineSelection(BaselineSelectionAction { preparation_step: true, .. })
                )));
                assert!(!selection.preparation_step);
                assert!(!block.description().is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

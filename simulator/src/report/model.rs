use rficore::data::Baseline;
use rficore::telemetry::Metrics;
use rficore::{StrategyFlags, TelescopeId};
use serde::{Deserialize, Serialize};

use crate::workflow::runner::{BaselineOutcome, WorkflowResult};

/// Summary of one simulator run, written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub telescope: TelescopeId,
    pub flags: StrategyFlags,
    pub description: Option<String>,
    pub total_samples: usize,
    pub total_flagged: usize,
    pub total_injected: usize,
    pub total_detected: usize,
    pub metrics: Metrics,
    pub baselines: Vec<BaselineOutcome>,
    pub bad_baselines: Vec<Baseline>,
}

impl RunReport {
    pub fn new(
        telescope: TelescopeId,
        flags: StrategyFlags,
        description: Option<String>,
        result: &WorkflowResult,
    ) -> Self {
        let sum = |f: fn(&BaselineOutcome) -> usize| -> usize { result.outcomes.iter().map(f).sum() };
        Self {
            telescope,
            flags,
            description,
            total_samples: sum(|o| o.samples),
            total_flagged: sum(|o| o.flagged),
            total_injected: sum(|o| o.injected),
            total_detected: sum(|o| o.detected),
            metrics: result.metrics,
            baselines: result.outcomes.clone(),
            bad_baselines: result.bad_baselines.clone(),
        }
    }

    pub fn flagged_fraction(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.total_flagged as f64 / self.total_samples as f64
        }
    }

    /// Share of the injected samples that were flagged; `None` without RFI.
    pub fn recall(&self) -> Option<f64> {
        (self.total_injected > 0).then(|| self.total_detected as f64 / self.total_injected as f64)
    }
}

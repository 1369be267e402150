use serde::{Deserialize, Serialize};

/// Instruments with a tuned default strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TelescopeId {
    #[default]
    Generic,
    Lofar,
    Mwa,
    Wsrt,
}

/// Correlated antenna pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Baseline {
    pub antenna1: usize,
    pub antenna2: usize,
}

impl Baseline {
    pub fn new(antenna1: usize, antenna2: usize) -> Self {
        Self { antenna1, antenna2 }
    }

    pub fn is_auto_correlation(&self) -> bool {
        self.antenna1 == self.antenna2
    }
}

/// Observation context carried alongside the data of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeFrequencyMetadata {
    pub telescope: TelescopeId,
    pub baseline: Option<Baseline>,
    /// Centre frequency of every channel (row), in Hz.
    #[serde(default)]
    pub channel_frequencies: Vec<f64>,
    /// Time of every timestep (column).
    #[serde(default)]
    pub observation_times: Vec<f64>,
}

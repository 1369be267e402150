pub mod artifacts;
pub mod baselines;
pub mod metadata;
pub mod time_frequency;

pub use artifacts::ArtifactSet;
pub use baselines::{BaselineData, BaselineRecord, BaselineSource, MemoryBaselineSource};
pub use metadata::{Baseline, TelescopeId, TimeFrequencyMetadata};
pub use time_frequency::{Polarization, Representation, TimeFrequencyData};

//! RFI flagging engine for radio-astronomy visibilities.
//!
//! A [`Strategy`] is a tree of actions executed against the time/frequency
//! images of one baseline; the result is a mask of samples judged to be
//! interference. [`Flagger`] is the public entry point.

pub mod buffers;
pub mod data;
pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod quality;
pub mod strategy;
pub mod telemetry;

pub use data::TelescopeId;
pub use interface::{FlagMask, Flagger, ImageSet, QualityStatistics};
pub use prelude::{FlagError, FlagResult, NullProgressListener, ProgressListener};
pub use strategy::{Strategy, StrategyFlags, StrategyOptions};

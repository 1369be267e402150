pub mod kernel;
pub mod stats;

pub use kernel::gaussian_kernel;
pub use stats::{StatsHelper, ValueRange};

pub mod buffer_pool;
pub mod high_pass;
pub mod morphology;
pub mod passband;
pub mod selection;
pub mod sir;
pub mod sum_threshold;

pub use buffer_pool::BufferPool;
pub use high_pass::HighPassFilter;
pub use morphology::dilate_flags;
pub use passband::calibrate_passband;
pub use selection::{flag_outlier_channels, flag_outlier_timesteps};
pub use sum_threshold::{sum_threshold, Sensitivities, ThresholdConfig};

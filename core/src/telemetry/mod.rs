pub mod log;
pub mod metrics;

pub use log::{LogManager, LoggingProgressListener};
pub use metrics::{Metrics, MetricsRecorder};

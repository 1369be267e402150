use log::{debug, info};

use crate::prelude::ProgressListener;

/// Thin wrapper around the `log` facade that tags every line with the
/// component it comes from.
#[derive(Debug, Clone)]
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.component, message);
    }

    pub fn trace_step(&self, message: &str) {
        debug!("[{}] {}", self.component, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("rficore")
    }
}

/// Progress listener that writes task transitions to the log.
pub struct LoggingProgressListener {
    logger: LogManager,
}

impl LoggingProgressListener {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("progress"),
        }
    }
}

impl Default for LoggingProgressListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for LoggingProgressListener {
    fn on_start_task(&self, task_no: usize, task_count: usize, description: &str) {
        self.logger
            .trace_step(&format!("task {}/{}: {}", task_no + 1, task_count, description));
    }

    fn on_progress(&self, progress: usize, max_progress: usize) {
        self.logger
            .trace_step(&format!("progress {}/{}", progress, max_progress));
    }

    fn on_end_task(&self) {
        self.logger.trace_step("task done");
    }
}

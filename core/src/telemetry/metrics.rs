use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::prelude::ProgressListener;

/// Counts task notifications; shareable between workers.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub started: usize,
    pub finished: usize,
    pub progress_updates: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }

    fn update(&self, f: impl FnOnce(&mut Metrics)) {
        if let Ok(mut metrics) = self.inner.lock() {
            f(&mut metrics);
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for MetricsRecorder {
    fn on_start_task(&self, _task_no: usize, _task_count: usize, _description: &str) {
        self.update(|m| m.started += 1);
    }

    fn on_progress(&self, _progress: usize, _max_progress: usize) {
        self.update(|m| m.progress_updates += 1);
    }

    fn on_end_task(&self) {
        self.update(|m| m.finished += 1);
    }
}

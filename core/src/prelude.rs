use std::path::PathBuf;

/// Common error type for every flagging operation.
#[derive(thiserror::Error, Debug)]
pub enum FlagError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FlagError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FlagError::InvalidArgument(message.into())
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        FlagError::InconsistentState(message.into())
    }

    /// True for failures delegated to file/storage collaborators.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, FlagError::Io { .. } | FlagError::Format { .. })
    }
}

pub type FlagResult<T> = Result<T, FlagError>;

/// Observer for long-running strategy execution.
///
/// Callbacks take `&self` so one listener can be shared by many workers; the
/// listener has no way to abort a run.
pub trait ProgressListener: Send + Sync {
    fn on_start_task(&self, task_no: usize, task_count: usize, description: &str);
    fn on_progress(&self, _progress: usize, _max_progress: usize) {}
    fn on_end_task(&self);
}

/// Listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressListener;

impl ProgressListener for NullProgressListener {
    fn on_start_task(&self, _task_no: usize, _task_count: usize, _description: &str) {}

    fn on_end_task(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_are_reported_as_io_failures() {
        let err = FlagError::Io {
            path: PathBuf::from("missing.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_io_failure());
        assert!(!FlagError::invalid("count").is_io_failure());
        assert!(err.to_string().contains("missing.json"));
    }
}

use crate::sink::SinkError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to plan scan: {0}")]
    Planning(#[source] StorageError),

    #[error("Failed to open cursor for partition {partition}: {source}")]
    OpenCursor {
        partition: usize,
        source: StorageError,
    },

    #[error("Failed to read cursor for partition {partition}: {source}")]
    ReadCursor {
        partition: usize,
        source: StorageError,
    },

    #[error("Failed to submit scan event: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Scan worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("Scan canceled")]
    Canceled,
}

impl ScanError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ScanError::InvalidConfig(msg.into())
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ScanError::Canceled)
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;

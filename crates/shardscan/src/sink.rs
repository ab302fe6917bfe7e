use crate::shape::ScanEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink closed")]
    Closed,

    #[error("{0}")]
    String(String),
}

/// Where shaped scan events go.
///
/// Shared by every scan worker, so implementations must accept concurrent
/// submits. No ordering is guaranteed across workers.
pub trait EventSink: Sync + Send {
    /// Submit a single event.
    fn submit(&self, event: ScanEvent) -> Result<(), SinkError>;

    /// Signal that no more events will be submitted for this scan.
    ///
    /// Called at most once per scan, after every submit has returned.
    fn signal_end_of_stream(&self) -> Result<(), SinkError>;
}

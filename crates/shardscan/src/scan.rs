//! Coordinates a parallel scan: planning, channel selection and the worker
//! pool.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info};

use crate::completion::CompletionTracker;
use crate::config::{ScanOptions, ScanSettings};
use crate::errors::{Result, ScanError};
use crate::key::ClippedPartition;
use crate::planner::PartitionPlanner;
use crate::queue::WorkQueue;
use crate::shape::RowShaper;
use crate::sink::EventSink;
use crate::storage::PartitionSource;
use crate::worker::{ScanWorker, WorkerStats};

/// Handle for canceling a scan from outside the worker pool.
///
/// Workers stop before their next partition or row. Open cursors are still
/// closed. Canceled partitions are left unscanned.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Partitions in the plan across all channels.
    pub total_partitions: usize,
    /// Partitions scanned by this replica.
    pub partitions_scanned: usize,
    pub rows: usize,
    pub events: usize,
    pub workers: usize,
}

/// Entry point for running a scan.
#[derive(Debug, Clone)]
pub struct ParallelScan {
    settings: ScanSettings,
}

impl ParallelScan {
    /// Create a scan from raw options, validating them first.
    pub fn try_new(options: &ScanOptions) -> Result<Self> {
        Ok(ParallelScan {
            settings: options.validate()?,
        })
    }

    pub fn new(settings: ScanSettings) -> Self {
        ParallelScan { settings }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Plan the partitions this replica will scan.
    pub fn plan<S>(&self, source: &S) -> Result<ScanPlan>
    where
        S: PartitionSource,
    {
        let planned = PartitionPlanner::new(source).plan(&self.settings.range)?;
        let total_partitions = planned.len();
        let partitions = self.settings.channels.select(planned);

        // No point in spinning up more threads than we have partitions.
        let num_workers = self.settings.max_threads.min(partitions.len());

        debug!(
            channels = ?self.settings.channels,
            total_partitions,
            selected = partitions.len(),
            max_threads = self.settings.max_threads,
            num_workers,
            "planned scan"
        );

        Ok(ScanPlan {
            settings: self.settings.clone(),
            partitions,
            total_partitions,
            num_workers,
            cancel: CancelHandle::default(),
        })
    }

    /// Plan and execute the scan, blocking until all workers complete.
    pub fn run<S, K>(&self, source: &S, sink: &K) -> Result<ScanSummary>
    where
        S: PartitionSource,
        K: EventSink + ?Sized,
    {
        self.plan(source)?.execute(source, sink)
    }
}

/// Partitions selected for this replica, ready to execute.
#[derive(Debug)]
pub struct ScanPlan {
    settings: ScanSettings,
    partitions: Vec<ClippedPartition>,
    total_partitions: usize,
    num_workers: usize,
    cancel: CancelHandle,
}

impl ScanPlan {
    pub fn partitions(&self) -> &[ClippedPartition] {
        &self.partitions
    }

    pub fn total_partitions(&self) -> usize {
        self.total_partitions
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Execute the scan on a dedicated worker pool.
    ///
    /// Blocks until every worker exits. End of stream is signaled to the sink
    /// once all workers have drained the queue. On failure or cancel the
    /// first error is returned and end of stream is not signaled.
    pub fn execute<S, K>(self, source: &S, sink: &K) -> Result<ScanSummary>
    where
        S: PartitionSource,
        K: EventSink + ?Sized,
    {
        let ScanPlan {
            settings,
            partitions,
            total_partitions,
            num_workers,
            cancel,
        } = self;

        let tracker = CompletionTracker::new(num_workers, sink);

        if num_workers == 0 {
            if cancel.is_canceled() {
                return Err(ScanError::Canceled);
            }
            // Nothing will ever report, signal directly.
            info!(total_partitions, "no partitions to scan for this channel");
            tracker.signal_end_of_stream();
            return Ok(ScanSummary {
                total_partitions,
                ..Default::default()
            });
        }

        let pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("shardscan_worker_{idx}"))
            .num_threads(num_workers)
            .build()?;

        info!(
            total_partitions,
            partitions = partitions.len(),
            num_workers,
            "starting parallel scan"
        );

        let queue = WorkQueue::new(partitions);
        let shaper = RowShaper::new(settings.output.clone(), settings.result_count);
        let errors = FirstError::default();
        let totals = Mutex::new(WorkerStats::default());

        pool.scope(|s| {
            for idx in 0..num_workers {
                let worker = ScanWorker {
                    idx,
                    source,
                    sink,
                    queue: &queue,
                    settings: &settings,
                    shaper: &shaper,
                    cancel: &cancel,
                };
                let tracker = &tracker;
                let errors = &errors;
                let totals = &totals;
                let cancel = &cancel;

                s.spawn(move |_| {
                    match panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                        Ok(Ok(stats)) => {
                            totals.lock().merge(&stats);
                            tracker.report_finished();
                        }
                        Ok(Err(e)) => {
                            if !e.is_canceled() {
                                error!(worker = idx, %e, "scan worker failed");
                            }
                            // Partitions are never reassigned, stop everyone.
                            cancel.cancel();
                            errors.set(e);
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            error!(worker = idx, %message, "scan worker panicked");
                            cancel.cancel();
                            errors.set(ScanError::WorkerPanicked {
                                worker: idx,
                                message,
                            });
                        }
                    }
                });
            }
        });

        if let Some(e) = errors.take() {
            return Err(e);
        }

        let totals = totals.into_inner();
        let summary = ScanSummary {
            total_partitions,
            partitions_scanned: totals.partitions,
            rows: totals.rows,
            events: totals.events,
            workers: num_workers,
        };
        info!(?summary, "parallel scan complete");

        Ok(summary)
    }
}

/// Holds the first error reported by a worker.
#[derive(Debug, Default)]
struct FirstError {
    error: Mutex<Option<ScanError>>,
}

impl FirstError {
    /// Keep the first error, though a real failure replaces a cancel caused
    /// by it.
    fn set(&self, error: ScanError) {
        let mut slot = self.error.lock();
        let replace = match slot.as_ref() {
            None => true,
            Some(existing) => existing.is_canceled() && !error.is_canceled(),
        };
        if replace {
            *slot = Some(error);
        }
    }

    fn take(&self) -> Option<ScanError> {
        self.error.lock().take()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn first_error_wins() {
        let errors = FirstError::default();
        errors.set(ScanError::invalid_config("first"));
        errors.set(ScanError::Canceled);
        errors.set(ScanError::invalid_config("second"));

        match errors.take() {
            Some(ScanError::InvalidConfig(msg)) => assert_eq!("first", msg),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(errors.take().is_none());
    }

    #[test]
    fn real_error_replaces_cancel() {
        let errors = FirstError::default();
        errors.set(ScanError::Canceled);
        errors.set(ScanError::ReadCursor {
            partition: 2,
            source: StorageError::new("boom"),
        });

        assert!(matches!(
            errors.take(),
            Some(ScanError::ReadCursor { partition: 2, .. })
        ));
    }

    #[test]
    fn cancel_handle_shared() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_canceled());
        clone.cancel();
        assert!(handle.is_canceled());
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!("static", panic_message(payload.as_ref()));

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!("owned", panic_message(payload.as_ref()));

        let payload: Box<dyn Any + Send> = Box::new(5);
        assert_eq!("unknown panic", panic_message(payload.as_ref()));
    }
}

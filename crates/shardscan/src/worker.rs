use tracing::{debug, trace, warn};

use crate::config::ScanSettings;
use crate::errors::{Result, ScanError};
use crate::key::ClippedPartition;
use crate::queue::WorkQueue;
use crate::scan::CancelHandle;
use crate::shape::RowShaper;
use crate::sink::EventSink;
use crate::storage::{PartitionSource, Row, ScanCursor, ScanRequest, StorageError};

/// Counters for work done by scan workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub partitions: usize,
    pub rows: usize,
    pub events: usize,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.partitions += other.partitions;
        self.rows += other.rows;
        self.events += other.events;
    }
}

/// A single scan worker draining the shared queue.
#[derive(Debug)]
pub(crate) struct ScanWorker<'a, S, K: ?Sized> {
    pub(crate) idx: usize,
    pub(crate) source: &'a S,
    pub(crate) sink: &'a K,
    pub(crate) queue: &'a WorkQueue<ClippedPartition>,
    pub(crate) settings: &'a ScanSettings,
    pub(crate) shaper: &'a RowShaper,
    pub(crate) cancel: &'a CancelHandle,
}

impl<S, K> ScanWorker<'_, S, K>
where
    S: PartitionSource,
    K: EventSink + ?Sized,
{
    /// Scan partitions until the queue is empty.
    ///
    /// Every event this worker produces has been submitted by the time this
    /// returns.
    pub(crate) fn run(&self) -> Result<WorkerStats> {
        if let Some(delay) = self.settings.init_delay {
            trace!(worker = self.idx, ?delay, "delaying scan start");
            std::thread::sleep(delay);
        }

        let mut stats = WorkerStats::default();
        loop {
            if self.cancel.is_canceled() {
                return Err(ScanError::Canceled);
            }

            let partition = match self.queue.pop() {
                Some(partition) => partition,
                None => break,
            };

            trace!(worker = self.idx, %partition, "scanning partition");
            self.scan_partition(&partition, &mut stats)?;
            stats.partitions += 1;
        }

        debug!(
            worker = self.idx,
            partitions = stats.partitions,
            rows = stats.rows,
            events = stats.events,
            "scan worker drained queue"
        );

        Ok(stats)
    }

    fn scan_partition(&self, partition: &ClippedPartition, stats: &mut WorkerStats) -> Result<()> {
        let request = ScanRequest {
            start: partition.start().clone(),
            end: partition.end().clone(),
            min_timestamp: self.settings.min_timestamp,
            max_versions: self.settings.max_versions,
            columns: &self.settings.columns,
        };

        let cursor = self
            .source
            .open_scan(&request)
            .map_err(|source| ScanError::OpenCursor {
                partition: partition.index,
                source,
            })?;
        // Closed on drop for every early return below.
        let mut cursor = CursorGuard::new(cursor, partition.index);

        loop {
            if self.cancel.is_canceled() {
                return Err(ScanError::Canceled);
            }

            let row = match cursor.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(source) => {
                    return Err(ScanError::ReadCursor {
                        partition: partition.index,
                        source,
                    });
                }
            };

            stats.rows += 1;
            stats.events += self.shaper.shape(row, |event| self.sink.submit(event))?;
        }

        cursor.close();
        Ok(())
    }
}

/// Owns an open cursor and closes it exactly once.
#[derive(Debug)]
struct CursorGuard<C: ScanCursor> {
    cursor: Option<C>,
    partition: usize,
}

impl<C: ScanCursor> CursorGuard<C> {
    fn new(cursor: C, partition: usize) -> Self {
        CursorGuard {
            cursor: Some(cursor),
            partition,
        }
    }

    fn next_row(&mut self) -> Result<Option<Row>, StorageError> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next_row(),
            None => Ok(None),
        }
    }

    fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            match cursor.close() {
                Ok(()) => trace!(partition = self.partition, "closed scan cursor"),
                // Cursor is discarded either way.
                Err(e) => warn!(partition = self.partition, %e, "failed to close scan cursor"),
            }
        }
    }
}

impl<C: ScanCursor> Drop for CursorGuard<C> {
    fn drop(&mut self) {
        self.release();
    }
}

//! In-memory partitioned table and collecting sink.
//!
//! Useful for embedding and for exercising the scan without a storage
//! cluster. Failures can be injected per partition.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::key::{Partition, RowKey, ScanRange};
use crate::shape::ScanEvent;
use crate::sink::{EventSink, SinkError};
use crate::storage::{PartitionSource, Row, ScanCursor, ScanRequest, StorageError, Versions};

/// Failure to inject when a scan starts at a given partition start key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Opening the cursor fails.
    Open,
    /// Reading fails after returning this many rows.
    Read { after_rows: usize },
    /// Closing the cursor fails.
    Close,
}

#[derive(Debug, Default)]
struct CursorCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug)]
pub struct MemoryTable {
    partitions: Vec<Partition>,
    rows: BTreeMap<RowKey, Row>,
    failures: HashMap<RowKey, InjectedFailure>,
    fail_listing: bool,
    counters: Arc<CursorCounters>,
}

impl MemoryTable {
    /// Create a table split at the given keys.
    ///
    /// The first partition starts at the empty key and the last one has an
    /// empty end, matching how storage reports open table bounds.
    pub fn with_split_points<K>(splits: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<RowKey>,
    {
        let mut splits: Vec<RowKey> = splits.into_iter().map(Into::into).collect();
        splits.sort();
        splits.dedup();

        let mut partitions = Vec::with_capacity(splits.len() + 1);
        let mut start = RowKey::new();
        for split in splits {
            partitions.push(Partition::new(start, split.clone()));
            start = split;
        }
        partitions.push(Partition::new(start, RowKey::new()));

        MemoryTable {
            partitions,
            rows: BTreeMap::new(),
            failures: HashMap::new(),
            fail_listing: false,
            counters: Arc::new(CursorCounters::default()),
        }
    }

    pub fn insert(&mut self, row: Row) {
        self.rows.insert(row.key.clone(), row);
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Inject a failure for scans requested at `start`.
    pub fn inject_failure(&mut self, start: impl Into<RowKey>, failure: InjectedFailure) {
        self.failures.insert(start.into(), failure);
    }

    /// Make partition listing and bounds lookups fail.
    pub fn fail_listing(&mut self) {
        self.fail_listing = true;
    }

    pub fn opened_cursors(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Cursors opened but not yet closed.
    pub fn open_cursors(&self) -> usize {
        // Load closed first so a concurrent open/close pair can't make it
        // exceed opened.
        let closed = self.counters.closed.load(Ordering::SeqCst);
        self.opened_cursors().saturating_sub(closed)
    }

    fn read_row(&self, row: &Row, request: &ScanRequest<'_>) -> Option<Row> {
        let limit = request.max_versions.limit().unwrap_or(usize::MAX);
        let mut out = Row::new(row.key.clone());

        for (family, qualifiers) in &row.families {
            for (qualifier, versions) in qualifiers {
                if !request.columns.includes(family, qualifier) {
                    continue;
                }

                let kept: Versions = versions
                    .iter()
                    .rev()
                    .filter(|(ts, _)| request.min_timestamp.is_none_or(|min| **ts >= min))
                    .take(limit)
                    .map(|(ts, value)| (*ts, value.clone()))
                    .collect();

                if !kept.is_empty() {
                    out.families
                        .entry(family.clone())
                        .or_default()
                        .insert(qualifier.clone(), kept);
                }
            }
        }

        // Storage doesn't return rows with nothing left after filtering.
        (!out.families.is_empty()).then_some(out)
    }
}

impl PartitionSource for MemoryTable {
    type Cursor = MemoryCursor;

    fn table_key_bounds(&self) -> Result<(RowKey, RowKey), StorageError> {
        if self.fail_listing {
            return Err(StorageError::new("table bounds unavailable"));
        }
        let start = self
            .partitions
            .first()
            .map(|p| p.start.clone())
            .unwrap_or_default();
        let end = self
            .partitions
            .last()
            .map(|p| p.end.clone())
            .unwrap_or_default();
        Ok((start, end))
    }

    fn list_partitions(&self, range: &ScanRange) -> Result<Vec<Partition>, StorageError> {
        if self.fail_listing {
            return Err(StorageError::new("partition listing unavailable"));
        }
        Ok(self
            .partitions
            .iter()
            .filter(|p| p.overlaps(&range.start, &range.end))
            .cloned()
            .collect())
    }

    fn open_scan(&self, request: &ScanRequest<'_>) -> Result<Self::Cursor, StorageError> {
        let failure = self.failures.get(&request.start).copied();
        if failure == Some(InjectedFailure::Open) {
            return Err(StorageError::new(format!(
                "cannot open scan at '{}'",
                request.start.escape_ascii()
            )));
        }

        let rows: Vec<Row> = self
            .rows
            .range(request.start.clone()..)
            .take_while(|(key, _)| request.end.is_empty() || *key < &request.end)
            .filter_map(|(_, row)| self.read_row(row, request))
            .collect();

        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryCursor {
            rows: rows.into_iter(),
            returned: 0,
            failure,
            counters: self.counters.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryCursor {
    rows: std::vec::IntoIter<Row>,
    returned: usize,
    failure: Option<InjectedFailure>,
    counters: Arc<CursorCounters>,
}

impl ScanCursor for MemoryCursor {
    fn next_row(&mut self) -> Result<Option<Row>, StorageError> {
        if let Some(InjectedFailure::Read { after_rows }) = self.failure {
            if self.returned >= after_rows {
                return Err(StorageError::new("injected read failure"));
            }
        }
        self.returned += 1;
        Ok(self.rows.next())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.failure == Some(InjectedFailure::Close) {
            return Err(StorageError::new("injected close failure"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    events: Vec<ScanEvent>,
    end_of_stream: usize,
    /// Events submitted after end of stream was signaled.
    late_events: usize,
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Reject submits once this many events have been accepted.
    limit: Option<usize>,
    state: Mutex<SinkState>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        CollectingSink {
            limit: Some(limit),
            state: Mutex::new(SinkState::default()),
        }
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.state.lock().events.clone()
    }

    pub fn num_events(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn end_of_stream_count(&self) -> usize {
        self.state.lock().end_of_stream
    }

    pub fn late_events(&self) -> usize {
        self.state.lock().late_events
    }
}

impl EventSink for CollectingSink {
    fn submit(&self, event: ScanEvent) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if self.limit.is_some_and(|limit| state.events.len() >= limit) {
            return Err(SinkError::Closed);
        }
        if state.end_of_stream > 0 {
            state.late_events += 1;
        }
        state.events.push(event);
        Ok(())
    }

    fn signal_end_of_stream(&self) -> Result<(), SinkError> {
        self.state.lock().end_of_stream += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ColumnSelection, MaxVersions};

    fn request<'a>(
        start: &'static str,
        end: &'static str,
        columns: &'a ColumnSelection,
    ) -> ScanRequest<'a> {
        ScanRequest {
            start: RowKey::from(start),
            end: RowKey::from(end),
            min_timestamp: None,
            max_versions: MaxVersions::Latest,
            columns,
        }
    }

    fn drain(cursor: &mut MemoryCursor) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn split_points_to_partitions() {
        let table = MemoryTable::with_split_points(["m", "d"]);
        assert_eq!(
            &[
                Partition::new("", "d"),
                Partition::new("d", "m"),
                Partition::new("m", ""),
            ],
            table.partitions()
        );

        let (min, max) = table.table_key_bounds().unwrap();
        assert!(min.is_empty());
        assert!(max.is_empty());
    }

    #[test]
    fn list_overlapping() {
        let table = MemoryTable::with_split_points(["c", "e", "g"]);
        let parts = table
            .list_partitions(&ScanRange {
                start: RowKey::from("d"),
                end: RowKey::from("f"),
            })
            .unwrap();
        assert_eq!(vec![Partition::new("c", "e"), Partition::new("e", "g")], parts);
    }

    #[test]
    fn scan_bounds_and_versions() {
        let mut table = MemoryTable::with_split_points(["m"]);
        table.insert(
            Row::new("a")
                .with_cell("f", "q", 1, "a1")
                .with_cell("f", "q", 2, "a2"),
        );
        table.insert(Row::new("l").with_cell("f", "q", 1, "l1"));
        table.insert(Row::new("m").with_cell("f", "q", 1, "m1"));

        let columns = ColumnSelection::All;
        let mut cursor = table.open_scan(&request("", "m", &columns)).unwrap();
        let rows = drain(&mut cursor);
        assert_eq!(2, rows.len());
        assert_eq!(1, rows[0].num_values());
        assert_eq!(b"a2", rows[0].families[b"f".as_slice()][b"q".as_slice()][&2].as_ref());

        cursor.close().unwrap();
        assert_eq!(0, table.open_cursors());

        let mut req = request("", "", &columns);
        req.max_versions = MaxVersions::All;
        let mut cursor = table.open_scan(&req).unwrap();
        let rows = drain(&mut cursor);
        assert_eq!(3, rows.len());
        assert_eq!(2, rows[0].num_values());
        assert_eq!(1, table.open_cursors());
    }

    #[test]
    fn scan_min_timestamp_drops_rows() {
        let mut table = MemoryTable::with_split_points(Vec::<RowKey>::new());
        table.insert(Row::new("a").with_cell("f", "q", 1, "old"));
        table.insert(Row::new("b").with_cell("f", "q", 10, "new"));

        let columns = ColumnSelection::All;
        let mut req = request("", "", &columns);
        req.min_timestamp = Some(5);
        let mut cursor = table.open_scan(&req).unwrap();
        let rows = drain(&mut cursor);
        assert_eq!(1, rows.len());
        assert_eq!(b"b", rows[0].key.as_ref());
    }

    #[test]
    fn scan_column_selection() {
        let mut table = MemoryTable::with_split_points(Vec::<RowKey>::new());
        table.insert(
            Row::new("a")
                .with_cell("f", "q", 1, "1")
                .with_cell("g", "q", 1, "2"),
        );

        let columns = ColumnSelection::Families(vec![RowKey::from("g")]);
        let mut cursor = table.open_scan(&request("", "", &columns)).unwrap();
        let rows = drain(&mut cursor);
        assert_eq!(1, rows.len());
        assert!(rows[0].families.contains_key(b"g".as_slice()));
        assert!(!rows[0].families.contains_key(b"f".as_slice()));
    }

    #[test]
    fn injected_failures() {
        let mut table = MemoryTable::with_split_points(["m"]);
        table.insert(Row::new("a").with_cell("f", "q", 1, "1"));
        table.inject_failure("", InjectedFailure::Open);
        table.inject_failure("m", InjectedFailure::Read { after_rows: 0 });

        let columns = ColumnSelection::All;
        table.open_scan(&request("", "m", &columns)).unwrap_err();

        let mut cursor = table.open_scan(&request("m", "", &columns)).unwrap();
        cursor.next_row().unwrap_err();

        table.fail_listing();
        table.table_key_bounds().unwrap_err();
    }

    #[test]
    fn collecting_sink_limit() {
        let sink = CollectingSink::with_limit(1);
        let event = ScanEvent::Record(crate::shape::RecordEvent {
            row: RowKey::from("a"),
            fields: BTreeMap::new(),
            result_count: None,
        });
        sink.submit(event.clone()).unwrap();
        sink.submit(event.clone()).unwrap_err();
        assert_eq!(1, sink.num_events());

        sink.signal_end_of_stream().unwrap();
        assert_eq!(1, sink.end_of_stream_count());
        assert_eq!(0, sink.late_events());
    }

    #[test]
    fn open_cursors_during_concurrent_scans() {
        let mut table = MemoryTable::with_split_points(Vec::<RowKey>::new());
        table.insert(Row::new("a").with_cell("f", "q", 1, "1"));
        let columns = ColumnSelection::All;

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let mut cursor = table.open_scan(&request("", "", &columns)).unwrap();
                        cursor.close().unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..2000 {
                    assert!(table.open_cursors() <= table.opened_cursors());
                }
            });
        });

        assert_eq!(2000, table.opened_cursors());
        assert_eq!(0, table.open_cursors());
    }
}

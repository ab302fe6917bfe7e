//! Parallel scans over partitioned key-value tables.
//!
//! A scan resolves the effective key range, lists and clips the table's
//! partitions, keeps the partitions owned by this replica's channel, and
//! drains them with a fixed pool of worker threads. Each worker opens one
//! cursor per partition and submits shaped events to a sink. The last worker
//! to finish signals end of stream.
pub mod channel;
pub mod completion;
pub mod config;
pub mod errors;
pub mod key;
pub mod memory;
pub mod planner;
pub mod queue;
pub mod scan;
pub mod shape;
pub mod sink;
pub mod storage;

mod worker;

pub use config::{ScanOptions, ScanSettings};
pub use errors::{Result, ScanError};
pub use key::{ClippedPartition, KeyRange, Partition, RowKey};
pub use scan::{CancelHandle, ParallelScan, ScanPlan, ScanSummary};
pub use shape::{OutputMode, ScanEvent};
pub use sink::EventSink;
pub use storage::{PartitionSource, ScanCursor};
pub use worker::WorkerStats;

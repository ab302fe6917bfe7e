//! Seam to the storage layer that owns the partitioned table.
use std::collections::BTreeMap;
use std::num::NonZeroU32;

use bytes::Bytes;

use crate::key::{Partition, RowKey, ScanRange};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    String(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn new(msg: impl Into<String>) -> Self {
        StorageError::String(msg.into())
    }
}

/// Version history for a single cell, keyed by timestamp.
pub type Versions = BTreeMap<i64, Bytes>;

/// Column family -> column qualifier -> version history.
pub type FamilyMap = BTreeMap<Bytes, BTreeMap<Bytes, Versions>>;

/// A single row as returned by a scan cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub key: RowKey,
    pub families: FamilyMap,
}

impl Row {
    pub fn new(key: impl Into<RowKey>) -> Self {
        Row {
            key: key.into(),
            families: FamilyMap::new(),
        }
    }

    /// Add a single versioned value.
    pub fn with_cell(
        mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        value: impl Into<Bytes>,
    ) -> Self {
        self.families
            .entry(family.into())
            .or_default()
            .entry(qualifier.into())
            .or_default()
            .insert(timestamp, value.into());
        self
    }

    /// Add a column with no versions.
    pub fn with_empty_cell(mut self, family: impl Into<Bytes>, qualifier: impl Into<Bytes>) -> Self {
        self.families
            .entry(family.into())
            .or_default()
            .entry(qualifier.into())
            .or_default();
        self
    }

    /// Total number of versioned values in the row.
    pub fn num_values(&self) -> usize {
        self.families
            .values()
            .flat_map(|quals| quals.values())
            .map(|versions| versions.len())
            .sum()
    }
}

/// How many versions of each cell a scan returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaxVersions {
    /// Only the newest version.
    #[default]
    Latest,
    /// Every retained version.
    All,
    /// At most this many versions, newest first.
    Exact(NonZeroU32),
}

impl MaxVersions {
    /// Resolve the raw option value.
    ///
    /// `None` keeps the latest version only. `Some(0)` is the sentinel for
    /// "all versions", not "zero versions".
    pub fn from_option(raw: Option<u32>) -> Self {
        match raw {
            None => MaxVersions::Latest,
            Some(n) => match NonZeroU32::new(n) {
                Some(n) => MaxVersions::Exact(n),
                None => MaxVersions::All,
            },
        }
    }

    /// Version cap, `None` for unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            MaxVersions::Latest => Some(1),
            MaxVersions::All => None,
            MaxVersions::Exact(n) => Some(n.get() as usize),
        }
    }
}

/// Which columns a scan returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    #[default]
    All,
    /// Whole column families.
    Families(Vec<Bytes>),
    /// Explicit (family, qualifier) pairs.
    Columns(Vec<(Bytes, Bytes)>),
}

impl ColumnSelection {
    /// Build the selection from configured families and qualifiers.
    ///
    /// With both set, the selection is the cross product. Qualifiers without
    /// families is rejected during config validation.
    pub fn from_names(families: Option<&[String]>, qualifiers: Option<&[String]>) -> Self {
        match (families, qualifiers) {
            (Some(families), Some(qualifiers)) => {
                let mut columns = Vec::with_capacity(families.len() * qualifiers.len());
                for fam in families {
                    for qual in qualifiers {
                        columns.push((
                            Bytes::copy_from_slice(fam.as_bytes()),
                            Bytes::copy_from_slice(qual.as_bytes()),
                        ));
                    }
                }
                ColumnSelection::Columns(columns)
            }
            (Some(families), None) => ColumnSelection::Families(
                families
                    .iter()
                    .map(|fam| Bytes::copy_from_slice(fam.as_bytes()))
                    .collect(),
            ),
            _ => ColumnSelection::All,
        }
    }

    pub fn includes(&self, family: &[u8], qualifier: &[u8]) -> bool {
        match self {
            ColumnSelection::All => true,
            ColumnSelection::Families(families) => families.iter().any(|f| f.as_ref() == family),
            ColumnSelection::Columns(columns) => columns
                .iter()
                .any(|(f, q)| f.as_ref() == family && q.as_ref() == qualifier),
        }
    }
}

/// Parameters for opening a cursor over one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest<'a> {
    /// Inclusive start key, empty for the table start.
    pub start: RowKey,
    /// Exclusive end key, empty for the table end.
    pub end: RowKey,
    /// Versions older than this timestamp are excluded.
    pub min_timestamp: Option<i64>,
    pub max_versions: MaxVersions,
    pub columns: &'a ColumnSelection,
}

/// An open scan over a single partition.
///
/// Cursors are owned by the worker that opened them and never leave that
/// thread.
pub trait ScanCursor {
    /// Get the next row in key order, or None when exhausted.
    fn next_row(&mut self) -> Result<Option<Row>, StorageError>;

    /// Release the cursor.
    ///
    /// Called exactly once, on every exit path.
    fn close(&mut self) -> Result<(), StorageError>;
}

/// Storage client for a partitioned table.
pub trait PartitionSource: Sync + Send {
    type Cursor: ScanCursor;

    /// Get the table-wide (minimum, maximum) keys.
    fn table_key_bounds(&self) -> Result<(RowKey, RowKey), StorageError>;

    /// List partitions overlapping the range, in key order.
    fn list_partitions(&self, range: &ScanRange) -> Result<Vec<Partition>, StorageError>;

    /// Open a cursor bounded by the request.
    fn open_scan(&self, request: &ScanRequest<'_>) -> Result<Self::Cursor, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_versions_sentinel() {
        assert_eq!(MaxVersions::Latest, MaxVersions::from_option(None));
        assert_eq!(MaxVersions::All, MaxVersions::from_option(Some(0)));
        assert_eq!(
            MaxVersions::Exact(NonZeroU32::new(3).unwrap()),
            MaxVersions::from_option(Some(3))
        );

        assert_eq!(Some(1), MaxVersions::Latest.limit());
        assert_eq!(None, MaxVersions::All.limit());
        assert_eq!(Some(3), MaxVersions::from_option(Some(3)).limit());
    }

    #[test]
    fn column_selection_cross_product() {
        let families = vec!["f1".to_string(), "f2".to_string()];
        let qualifiers = vec!["a".to_string(), "b".to_string()];

        let sel = ColumnSelection::from_names(Some(families.as_slice()), Some(qualifiers.as_slice()));
        match &sel {
            ColumnSelection::Columns(cols) => assert_eq!(4, cols.len()),
            other => panic!("unexpected selection: {other:?}"),
        }
        assert!(sel.includes(b"f2", b"a"));
        assert!(!sel.includes(b"f3", b"a"));
        assert!(!sel.includes(b"f1", b"c"));
    }

    #[test]
    fn column_selection_families_only() {
        let families = vec!["f1".to_string()];
        let sel = ColumnSelection::from_names(Some(families.as_slice()), None);
        assert!(sel.includes(b"f1", b"anything"));
        assert!(!sel.includes(b"f2", b"anything"));

        assert_eq!(ColumnSelection::All, ColumnSelection::from_names(None, None));
    }

    #[test]
    fn row_builder_counts_values() {
        let row = Row::new("r1")
            .with_cell("f", "a", 1, "x")
            .with_cell("f", "a", 2, "y")
            .with_cell("g", "b", 1, "z")
            .with_empty_cell("g", "c");
        assert_eq!(3, row.num_values());
        assert_eq!(2, row.families.len());
    }
}

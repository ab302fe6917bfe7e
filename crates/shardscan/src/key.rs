use std::fmt;

use bytes::Bytes;

/// Raw row key.
///
/// The empty key is the storage convention for "table minimum" when used as a
/// start bound, and "table maximum" when used as an end bound.
pub type RowKey = Bytes;

/// Caller supplied key range, half-open.
///
/// A missing bound resolves to the table's minimum or maximum key at planning
/// time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Option<RowKey>,
    pub end: Option<RowKey>,
}

impl KeyRange {
    /// Range covering the whole table.
    pub const fn full() -> Self {
        KeyRange {
            start: None,
            end: None,
        }
    }

    pub fn new(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        KeyRange {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Effective range after resolving missing bounds against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub start: RowKey,
    pub end: RowKey,
}

/// A contiguous, non-overlapping slice of the table's key space.
///
/// An empty `end` means the partition extends to the end of the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub start: RowKey,
    pub end: RowKey,
}

impl Partition {
    pub fn new(start: impl Into<RowKey>, end: impl Into<RowKey>) -> Self {
        Partition {
            start: start.into(),
            end: end.into(),
        }
    }

    /// If `key` falls inside this partition.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_ref() <= key && (self.end.is_empty() || key < self.end.as_ref())
    }

    /// If this partition intersects `[start, end)`. Empty bounds are open.
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        (self.end.is_empty() || start < self.end.as_ref())
            && (end.is_empty() || self.start.as_ref() < end)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.escape_ascii(),
            self.end.escape_ascii()
        )
    }
}

/// A partition narrowed to the effective scan range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedPartition {
    /// Position of the partition in the planned sequence.
    pub index: usize,
    pub bounds: Partition,
}

impl ClippedPartition {
    pub fn start(&self) -> &RowKey {
        &self.bounds.start
    }

    pub fn end(&self) -> &RowKey {
        &self.bounds.end
    }
}

impl fmt::Display for ClippedPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_bounded() {
        let p = Partition::new("c", "e");
        assert!(p.contains(b"c"));
        assert!(p.contains(b"d"));
        assert!(p.contains(b"dzzz"));
        assert!(!p.contains(b"e"));
        assert!(!p.contains(b"b"));
    }

    #[test]
    fn contains_open_ends() {
        let first = Partition::new("", "c");
        assert!(first.contains(b""));
        assert!(first.contains(b"a"));
        assert!(!first.contains(b"c"));

        let last = Partition::new("x", "");
        assert!(last.contains(b"x"));
        assert!(last.contains(b"zzzz"));
        assert!(!last.contains(b"w"));
    }

    #[test]
    fn overlaps_ranges() {
        let p = Partition::new("c", "e");
        assert!(p.overlaps(b"", b""));
        assert!(p.overlaps(b"a", b"d"));
        assert!(p.overlaps(b"d", b""));
        assert!(!p.overlaps(b"a", b"c"));
        assert!(!p.overlaps(b"e", b"g"));
    }

    #[test]
    fn display_escapes() {
        let p = Partition::new(Bytes::from_static(b"a\x01"), "");
        assert_eq!("[a\\x01, )", p.to_string());
    }
}

use tracing::debug;

use crate::errors::{Result, ScanError};
use crate::key::{ClippedPartition, KeyRange, Partition, ScanRange};
use crate::storage::PartitionSource;

/// Plans the set of partition bounds to scan.
#[derive(Debug)]
pub struct PartitionPlanner<'a, S> {
    source: &'a S,
}

impl<'a, S> PartitionPlanner<'a, S>
where
    S: PartitionSource,
{
    pub fn new(source: &'a S) -> Self {
        PartitionPlanner { source }
    }

    /// Resolve missing bounds against the table's key bounds.
    ///
    /// The table bounds are only requested if one of the bounds is missing.
    pub fn resolve_range(&self, range: &KeyRange) -> Result<ScanRange> {
        if let (Some(start), Some(end)) = (&range.start, &range.end) {
            return Ok(ScanRange {
                start: start.clone(),
                end: end.clone(),
            });
        }

        let (table_min, table_max) = self
            .source
            .table_key_bounds()
            .map_err(ScanError::Planning)?;

        Ok(ScanRange {
            start: range.start.clone().unwrap_or(table_min),
            end: range.end.clone().unwrap_or(table_max),
        })
    }

    /// Produce the clipped partition list for the range, in storage order.
    pub fn plan(&self, range: &KeyRange) -> Result<Vec<ClippedPartition>> {
        let range = self.resolve_range(range)?;
        debug!(
            start = %range.start.escape_ascii(),
            end = %range.end.escape_ascii(),
            "resolved scan range"
        );

        // We assume the partition list doesn't change for the lifetime of the
        // scan.
        let partitions = self
            .source
            .list_partitions(&range)
            .map_err(ScanError::Planning)?;

        Ok(clip_partitions(partitions, &range))
    }
}

/// Clip every partition to the range, preserving order.
pub fn clip_partitions(partitions: Vec<Partition>, range: &ScanRange) -> Vec<ClippedPartition> {
    partitions
        .into_iter()
        .enumerate()
        .map(|(index, partition)| {
            let bounds = clip_partition(&partition, range);
            if bounds != partition {
                debug!(partition = index, original = %partition, clipped = %bounds, "clipped partition");
            }
            ClippedPartition { index, bounds }
        })
        .collect()
}

/// Narrow a partition to the range.
///
/// A bound is only replaced when the range's key falls inside the partition,
/// so a clip never crosses into an adjacent partition. Empty keys mean the
/// table start/end and never clip.
pub fn clip_partition(partition: &Partition, range: &ScanRange) -> Partition {
    let mut clipped = partition.clone();

    if !range.start.is_empty() && partition.contains(&range.start) {
        clipped.start = range.start.clone();
    }
    if !range.end.is_empty() && partition.contains(&range.end) {
        clipped.end = range.end.clone();
    }

    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RowKey;

    fn range(start: &'static str, end: &'static str) -> ScanRange {
        ScanRange {
            start: RowKey::from(start),
            end: RowKey::from(end),
        }
    }

    fn bounds(parts: &[ClippedPartition]) -> Vec<Partition> {
        parts.iter().map(|p| p.bounds.clone()).collect()
    }

    #[test]
    fn clip_edges_only() {
        let partitions = vec![
            Partition::new("a", "c"),
            Partition::new("c", "e"),
            Partition::new("e", "g"),
        ];

        let clipped = clip_partitions(partitions, &range("b", "f"));
        let expected = vec![
            Partition::new("b", "c"),
            Partition::new("c", "e"),
            Partition::new("e", "f"),
        ];
        assert_eq!(expected, bounds(&clipped));

        let indices: Vec<_> = clipped.iter().map(|p| p.index).collect();
        assert_eq!(vec![0, 1, 2], indices);
    }

    #[test]
    fn clip_open_table_bounds() {
        let partitions = vec![Partition::new("", "m"), Partition::new("m", "")];

        // Empty effective bounds leave everything alone.
        let clipped = clip_partitions(partitions.clone(), &range("", ""));
        let expected = vec![Partition::new("", "m"), Partition::new("m", "")];
        assert_eq!(expected, bounds(&clipped));

        let clipped = clip_partitions(partitions, &range("d", "x"));
        let expected = vec![Partition::new("d", "m"), Partition::new("m", "x")];
        assert_eq!(expected, bounds(&clipped));
    }

    #[test]
    fn clip_range_inside_single_partition() {
        let clipped = clip_partition(&Partition::new("a", "z"), &range("c", "d"));
        assert_eq!(Partition::new("c", "d"), clipped);
    }

    #[test]
    fn clip_boundary_on_partition_edge() {
        // Range start equal to the partition start is a no-op, range end
        // equal to the partition end isn't contained.
        let clipped = clip_partition(&Partition::new("c", "e"), &range("c", "e"));
        assert_eq!(Partition::new("c", "e"), clipped);
    }
}

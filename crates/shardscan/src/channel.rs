//! Static assignment of partitions to cooperating replicas.

/// Channel that owns the partition at `partition_index`.
///
/// With zero channels every partition belongs to the single implicit channel
/// 0.
pub const fn owner_channel(partition_index: usize, max_channels: usize) -> usize {
    if max_channels == 0 {
        0
    } else {
        partition_index % max_channels
    }
}

/// Which partitions this replica is responsible for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// Not part of a parallel region, scan everything.
    #[default]
    Unsharded,
    /// One of `max_channels` replicas.
    ///
    /// `channel < max_channels` is checked during config validation.
    Channel { channel: usize, max_channels: usize },
}

impl ChannelAssignment {
    pub fn owns(&self, partition_index: usize) -> bool {
        match self {
            ChannelAssignment::Unsharded => true,
            ChannelAssignment::Channel {
                channel,
                max_channels,
            } => owner_channel(partition_index, *max_channels) == *channel,
        }
    }

    /// Keep the items at positions owned by this channel, preserving order.
    ///
    /// Selection is purely positional.
    pub fn select<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| self.owns(idx).then_some(item))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn unsharded_selects_all() {
        let selected = ChannelAssignment::Unsharded.select(0..7);
        assert_eq!((0..7).collect::<Vec<_>>(), selected);
    }

    #[test]
    fn two_channels_of_four() {
        let ch0 = ChannelAssignment::Channel {
            channel: 0,
            max_channels: 2,
        };
        let ch1 = ChannelAssignment::Channel {
            channel: 1,
            max_channels: 2,
        };

        assert_eq!(vec![0, 2], ch0.select(0..4));
        assert_eq!(vec![1, 3], ch1.select(0..4));
    }

    #[test]
    fn more_channels_than_partitions() {
        let ch = ChannelAssignment::Channel {
            channel: 4,
            max_channels: 5,
        };
        assert!(ch.select(0..3).is_empty());
    }

    #[test]
    fn channels_cover_exactly_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(84);

        for _ in 0..200 {
            let num_partitions = rng.random_range(0..64);
            let max_channels = rng.random_range(1..12);

            let mut seen = HashSet::new();
            let mut total = 0;
            for channel in 0..max_channels {
                let assignment = ChannelAssignment::Channel {
                    channel,
                    max_channels,
                };
                let selected = assignment.select(0..num_partitions);
                // Determinism.
                assert_eq!(selected, assignment.select(0..num_partitions));

                total += selected.len();
                for idx in selected {
                    assert!(seen.insert(idx), "partition {idx} selected twice");
                }
            }

            assert_eq!(num_partitions, total);
            assert_eq!(num_partitions, seen.len());
        }
    }

    #[test]
    fn owner_channel_zero_channels() {
        assert_eq!(0, owner_channel(17, 0));
        assert_eq!(2, owner_channel(17, 5));
    }
}

//! # Work Sharding
//!
//! Splits a batch of independent work units into contiguous partitions, one per
//! worker invocation.
//!
//! With `N` units and parallelism `P`, the chunked layout is `P - 1` partitions of
//! `floor(N / P)` units followed by one partition holding the remainder. No unit is
//! dropped or duplicated and concatenating the partitions in order gives back the
//! input. Empty input yields no partitions; no partition is ever empty.

/// Partitioning rule applied before chunking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardStrategy {
    /// When `P * 10 > N` everything stays in one partition: per-worker overhead
    /// would dominate a small batch. Used for record scanning.
    Coalesce,
    /// When `P >= N` every unit gets its own partition. Used for proving, where
    /// each unit is expensive on its own.
    Spread,
}

/// Partition `units` for `parallelism` workers. A parallelism of 0 is treated as 1.
pub fn shard<T>(units: Vec<T>, parallelism: usize, strategy: ShardStrategy) -> Vec<Vec<T>> {
    let parallelism = parallelism.max(1);
    let total = units.len();

    if total == 0 {
        return Vec::new();
    }

    match strategy {
        ShardStrategy::Coalesce if parallelism * 10 > total => return vec![units],
        ShardStrategy::Spread if parallelism >= total => {
            return units.into_iter().map(|unit| vec![unit]).collect();
        }
        _ => {}
    }

    let chunk_size = total / parallelism;
    let mut partitions = Vec::with_capacity(parallelism);
    let mut remaining = units.into_iter();
    for _ in 0..parallelism - 1 {
        partitions.push(remaining.by_ref().take(chunk_size).collect());
    }
    partitions.push(remaining.collect());
    partitions
}

/// Sizes of the partitions `shard` would produce, without moving any data.
pub fn partition_sizes(total: usize, parallelism: usize, strategy: ShardStrategy) -> Vec<usize> {
    let parallelism = parallelism.max(1);
    if total == 0 {
        return Vec::new();
    }
    match strategy {
        ShardStrategy::Coalesce if parallelism * 10 > total => vec![total],
        ShardStrategy::Spread if parallelism >= total => vec![1; total],
        _ => {
            let chunk_size = total / parallelism;
            let mut sizes = vec![chunk_size; parallelism - 1];
            sizes.push(total - chunk_size * (parallelism - 1));
            sizes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_batch_coalesces() {
        for total in 1..40 {
            let units: Vec<usize> = (0..total).collect();
            let partitions = shard(units.clone(), 4, ShardStrategy::Coalesce);
            assert_eq!(partitions, vec![units], "N={}", total);
        }
    }

    #[test]
    fn test_chunked_layout_reconstructs_input() {
        for parallelism in 1..=8 {
            for total in (parallelism * 10)..(parallelism * 10 + 60) {
                let units: Vec<usize> = (0..total).collect();
                let partitions = shard(units.clone(), parallelism, ShardStrategy::Coalesce);

                assert_eq!(partitions.len(), parallelism);
                assert!(partitions.iter().all(|p| !p.is_empty()));

                let chunk = total / parallelism;
                for partition in &partitions[..parallelism - 1] {
                    assert_eq!(partition.len(), chunk);
                }
                let last = partitions[parallelism - 1].len();
                assert!(last >= chunk && last < chunk + parallelism, "N={} P={}", total, parallelism);

                let flattened: Vec<usize> = partitions.into_iter().flatten().collect();
                assert_eq!(flattened, units);
            }
        }
    }

    #[test]
    fn test_spread_one_unit_per_partition() {
        let partitions = shard(vec!['a', 'b', 'c'], 8, ShardStrategy::Spread);
        assert_eq!(partitions, vec![vec!['a'], vec!['b'], vec!['c']]);
    }

    #[test]
    fn test_spread_chunks_thirty_seven_over_four() {
        let partitions = shard((0..37).collect::<Vec<u32>>(), 4, ShardStrategy::Spread);
        let sizes: Vec<usize> = partitions.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![9, 9, 9, 10]);
        assert_eq!(partition_sizes(37, 4, ShardStrategy::Spread), sizes);
    }

    #[test]
    fn test_empty_and_zero_parallelism() {
        assert!(shard(Vec::<u8>::new(), 4, ShardStrategy::Coalesce).is_empty());
        assert!(shard(Vec::<u8>::new(), 4, ShardStrategy::Spread).is_empty());
        assert_eq!(shard(vec![1, 2, 3], 0, ShardStrategy::Spread), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_partition_sizes_match_shard() {
        for strategy in [ShardStrategy::Coalesce, ShardStrategy::Spread] {
            for parallelism in 1..6 {
                for total in 0..120 {
                    let sizes: Vec<usize> = shard((0..total).collect::<Vec<_>>(), parallelism, strategy)
                        .iter()
                        .map(Vec::len)
                        .collect();
                    assert_eq!(sizes, partition_sizes(total, parallelism, strategy));
                }
            }
        }
    }
}

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Size tiers that select the chunk size for a file.
///
/// Smaller files get smaller chunks. The boundaries are fixed
/// configuration, not derived from measured bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkTiers {
    /// Files up to this size use `small_chunk`.
    pub small_limit: u64,
    /// Files up to this size (and above `small_limit`) use `medium_chunk`.
    pub medium_limit: u64,
    pub small_chunk: u64,
    pub medium_chunk: u64,
    pub large_chunk: u64,
}

impl Default for ChunkTiers {
    fn default() -> Self {
        Self {
            small_limit: 30 * MIB,
            medium_limit: 100 * MIB,
            small_chunk: 2 * MIB,
            medium_chunk: 6 * MIB,
            large_chunk: 10 * MIB,
        }
    }
}

impl ChunkTiers {
    /// Returns the chunk size used for a file of `file_size` bytes.
    pub fn chunk_size_for(&self, file_size: u64) -> u64 {
        let size = if file_size <= self.small_limit {
            self.small_chunk
        } else if file_size <= self.medium_limit {
            self.medium_chunk
        } else {
            self.large_chunk
        };
        size.max(1)
    }

    /// Cuts a file of `file_size` bytes into ordered chunks named
    /// `{fingerprint}-{index}`.
    ///
    /// Always yields at least one chunk: an empty file becomes a single
    /// empty chunk.
    pub fn plan(&self, file_size: u64, fingerprint: &str) -> ChunkPlan {
        let chunk_size = self.chunk_size_for(file_size);
        let count = file_size.div_ceil(chunk_size).max(1) as usize;

        let chunks = (0..count)
            .map(|index| {
                let start = (index as u64 * chunk_size).min(file_size);
                let end = (start + chunk_size).min(file_size);
                Chunk {
                    index,
                    range: start..end,
                    name: format!("{fingerprint}-{index}"),
                }
            })
            .collect();

        ChunkPlan {
            chunk_size,
            chunks,
            step: 100.0 / count as f64,
        }
    }
}

/// A contiguous byte range of a file plus its server-side name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub range: Range<u64>,
    pub name: String,
}

impl Chunk {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ordered chunks of one file and the per-chunk progress step.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    chunk_size: u64,
    chunks: Vec<Chunk>,
    step: f64,
}

impl ChunkPlan {
    /// Progress percentage contributed by each chunk (`100 / count`).
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Number of chunks (never zero).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(plan: &ChunkPlan, size: u64) {
        let mut expected_start = 0;
        for (i, c) in plan.chunks().iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.range.start, expected_start, "gap or overlap at chunk {i}");
            expected_start = c.range.end;
        }
        assert_eq!(expected_start, size);
        let total: u64 = plan.chunks().iter().map(Chunk::len).sum();
        assert_eq!(total, size);
    }

    #[test]
    fn ten_mib_file_yields_five_chunks() {
        let plan = ChunkTiers::default().plan(10 * MIB, "abc");
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.chunk_size(), 2 * MIB);
        assert!((plan.step() - 20.0).abs() < f64::EPSILON);
        assert_partition(&plan, 10 * MIB);
    }

    #[test]
    fn empty_file_yields_single_empty_chunk() {
        let plan = ChunkTiers::default().plan(0, "abc");
        assert_eq!(plan.len(), 1);
        assert!(plan.get(0).unwrap().is_empty());
        assert_eq!(plan.get(0).unwrap().name, "abc-0");
        assert!((plan.step() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tier_boundaries() {
        let tiers = ChunkTiers::default();
        assert_eq!(tiers.chunk_size_for(30 * MIB), 2 * MIB);
        assert_eq!(tiers.chunk_size_for(30 * MIB + 1), 6 * MIB);
        assert_eq!(tiers.chunk_size_for(100 * MIB), 6 * MIB);
        assert_eq!(tiers.chunk_size_for(100 * MIB + 1), 10 * MIB);
    }

    #[test]
    fn last_chunk_is_short() {
        let plan = ChunkTiers::default().plan(5 * MIB + 7, "f");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.get(2).unwrap().len(), MIB + 7);
        assert_partition(&plan, 5 * MIB + 7);
    }

    #[test]
    fn ranges_partition_across_sizes() {
        let tiers = ChunkTiers {
            small_limit: 100,
            medium_limit: 1000,
            small_chunk: 7,
            medium_chunk: 64,
            large_chunk: 300,
        };
        for size in [0, 1, 6, 7, 8, 99, 100, 101, 999, 1000, 1001, 4321] {
            let plan = tiers.plan(size, "x");
            assert_partition(&plan, size);
        }
    }

    #[test]
    fn chunk_names_are_deterministic() {
        let plan = ChunkTiers::default().plan(5 * MIB, "deadbeef");
        let names: Vec<_> = plan.chunks().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["deadbeef-0", "deadbeef-1", "deadbeef-2"]);
    }

    #[test]
    fn zero_sized_tier_does_not_divide_by_zero() {
        let tiers = ChunkTiers {
            small_chunk: 0,
            ..ChunkTiers::default()
        };
        let plan = tiers.plan(3, "z");
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn tiers_deserialize_with_defaults() {
        let tiers: ChunkTiers = serde_json::from_str(r#"{"smallChunk":1}"#).unwrap();
        assert_eq!(tiers, ChunkTiers::default());
        let tiers: ChunkTiers = serde_json::from_str(r#"{"small_chunk":1048576}"#).unwrap();
        assert_eq!(tiers.small_chunk, MIB);
    }
}

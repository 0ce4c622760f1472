//! Fixed-size block partitioning of a sequence index.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SequenceIndex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Invalid block size {0}: must be at least 1")]
    InvalidBlockSize(u64),
}

/// A contiguous, 1-based inclusive coordinate range on one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub sequence: String,
    pub start: u64,
    pub end: u64,
}

impl Block {
    /// Number of bases covered by this block.
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Region string understood by samtools-style tools: `chr1:1-40`.
    pub fn region(&self) -> String {
        format!("{}:{}-{}", self.sequence, self.start, self.end)
    }

    /// Filename-safe prefix: `chr1_1_40`.
    pub fn prefix(&self) -> String {
        format!("{}_{}_{}", self.sequence, self.start, self.end)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.region())
    }
}

/// Lazy iterator over the blocks of every sequence in an index.
///
/// Sequences are visited in index order, blocks in ascending start order.
pub struct Blocks<'a> {
    index: &'a SequenceIndex,
    block_size: u64,
    current: Option<SequenceBlocks>,
    next_sequence: usize,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        loop {
            if let Some(block) = self.current.as_mut().and_then(|seq| seq.next()) {
                return Some(block);
            }

            let (name, length) = self.index.iter().nth(self.next_sequence)?;
            self.next_sequence += 1;
            self.current = Some(SequenceBlocks {
                sequence: name.to_string(),
                length,
                block_size: self.block_size,
                next_start: 1,
            });
        }
    }
}

/// Lazy iterator over the blocks of a single sequence.
pub struct SequenceBlocks {
    sequence: String,
    length: u64,
    block_size: u64,
    next_start: u64,
}

impl Iterator for SequenceBlocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next_start > self.length {
            return None;
        }

        let start = self.next_start;
        let end = start
            .saturating_add(self.block_size - 1)
            .min(self.length);
        self.next_start = end + 1;

        Some(Block {
            sequence: self.sequence.clone(),
            start,
            end,
        })
    }
}

/// Partition every sequence in `index` into blocks of `block_size` bases.
///
/// Yields `ceil(L / block_size)` blocks per sequence of length `L`; the last
/// block of a sequence is truncated to `L`.
pub fn partition(index: &SequenceIndex, block_size: u64) -> Result<Blocks<'_>, PartitionError> {
    if block_size == 0 {
        return Err(PartitionError::InvalidBlockSize(block_size));
    }

    Ok(Blocks {
        index,
        block_size,
        current: None,
        next_sequence: 0,
    })
}

/// Partition a single sequence. A zero-length sequence yields no blocks.
pub fn partition_sequence(
    sequence: &str,
    length: u64,
    block_size: u64,
) -> Result<SequenceBlocks, PartitionError> {
    if block_size == 0 {
        return Err(PartitionError::InvalidBlockSize(block_size));
    }

    Ok(SequenceBlocks {
        sequence: sequence.to_string(),
        length,
        block_size,
        next_start: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(sequence: &str, start: u64, end: u64) -> Block {
        Block {
            sequence: sequence.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_two_sequence_reference() {
        let index = SequenceIndex::new([("chr1", 100), ("chr2", 30)]).unwrap();
        let blocks: Vec<_> = partition(&index, 40).unwrap().collect();
        assert_eq!(
            blocks,
            vec![
                block("chr1", 1, 40),
                block("chr1", 41, 80),
                block("chr1", 81, 100),
                block("chr2", 1, 30),
            ]
        );
    }

    #[test]
    fn test_tiling_has_no_gaps_or_overlaps() {
        for length in 1..=64u64 {
            for block_size in 1..=20u64 {
                let blocks: Vec<_> = partition_sequence("s", length, block_size)
                    .unwrap()
                    .collect();

                assert_eq!(blocks.len() as u64, length.div_ceil(block_size));
                assert_eq!(blocks.first().map(|b| b.start), Some(1));
                assert_eq!(blocks.last().map(|b| b.end), Some(length));
                for pair in blocks.windows(2) {
                    assert_eq!(pair[0].end + 1, pair[1].start);
                }
                let last = blocks.last().unwrap();
                assert_eq!(last.span(), ((length - 1) % block_size) + 1);
            }
        }
    }

    #[test]
    fn test_short_sequence_single_block() {
        let blocks: Vec<_> = partition_sequence("chrM", 16, 1000).unwrap().collect();
        assert_eq!(blocks, vec![block("chrM", 1, 16)]);
    }

    #[test]
    fn test_zero_length_yields_nothing() {
        assert_eq!(partition_sequence("empty", 0, 10).unwrap().count(), 0);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let index = SequenceIndex::new([("chr1", 100)]).unwrap();
        assert_eq!(
            partition(&index, 0).err(),
            Some(PartitionError::InvalidBlockSize(0))
        );
        assert!(partition_sequence("chr1", 100, 0).is_err());
    }

    #[test]
    fn test_huge_block_size_does_not_overflow() {
        let blocks: Vec<_> = partition_sequence("chr1", 10, u64::MAX).unwrap().collect();
        assert_eq!(blocks, vec![block("chr1", 1, 10)]);
    }

    #[test]
    fn test_region_and_prefix() {
        let b = block("chr1", 41, 80);
        assert_eq!(b.region(), "chr1:41-80");
        assert_eq!(b.prefix(), "chr1_41_80");
        assert_eq!(b.span(), 40);
    }
}

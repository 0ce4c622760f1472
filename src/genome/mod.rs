//! Reference genome metadata and block partitioning.
//!
//! A reference is described by its sequence index (name + length per
//! sequence). The partitioner tiles every sequence into fixed-size,
//! 1-based inclusive coordinate ranges that become the unit of parallel work.

mod index;
mod partition;

pub use index::{IndexError, SequenceIndex};
pub use partition::{partition, partition_sequence, Block, Blocks, PartitionError, SequenceBlocks};

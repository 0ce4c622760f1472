//! Line-oriented VCF handling: merging per-block outputs and streaming
//! record filters. Records are never parsed beyond the columns a filter
//! needs.

mod filter;
mod merge;

pub use filter::{filter_records, FilterError, FilterStats, RecordFilter, StandardAlleles, StripInfoField};
pub use merge::{merge, merge_with, MergeError};

/// Header lines start with `#` (`##` meta lines and the `#CHROM` line).
pub fn is_header(line: &str) -> bool {
    line.starts_with('#')
}

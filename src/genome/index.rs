//! Sequence index loaded from a FASTA index (`.fai`) file.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed index line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Duplicate sequence name: {0}")]
    DuplicateName(String),
    #[error("Sequence {0} has zero length")]
    ZeroLength(String),
}

/// Ordered mapping from sequence name to sequence length.
///
/// Iteration order is the order the sequences were supplied in, which for
/// a `.fai` file is the reference order. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceIndex {
    sequences: Vec<(String, u64)>,
}

impl SequenceIndex {
    /// Build an index from `(name, length)` pairs.
    pub fn new<I, S>(entries: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut sequences = Vec::new();

        for (name, length) in entries {
            let name = name.into();
            if length == 0 {
                return Err(IndexError::ZeroLength(name));
            }
            if !seen.insert(name.clone()) {
                return Err(IndexError::DuplicateName(name));
            }
            sequences.push((name, length));
        }

        Ok(Self { sequences })
    }

    /// Parse the contents of a `.fai` file.
    ///
    /// Only the first two tab-separated columns are used. Blank lines are skipped.
    pub fn parse_fai(contents: &str) -> Result<Self, IndexError> {
        let mut entries = Vec::new();

        for (i, line) in contents.lines().enumerate() {
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }

            let mut cols = line.split('\t');
            let name = cols.next().filter(|s| !s.is_empty()).ok_or_else(|| {
                IndexError::Malformed {
                    line: line_no,
                    reason: "missing sequence name".to_string(),
                }
            })?;
            let length = cols
                .next()
                .ok_or_else(|| IndexError::Malformed {
                    line: line_no,
                    reason: "missing sequence length".to_string(),
                })?
                .trim()
                .parse::<u64>()
                .map_err(|e| IndexError::Malformed {
                    line: line_no,
                    reason: format!("invalid length: {}", e),
                })?;

            entries.push((name.to_string(), length));
        }

        Self::new(entries)
    }

    /// Load a `.fai` file from disk.
    pub fn from_fai(path: &Path) -> Result<Self, IndexError> {
        let contents = std::fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_fai(&contents)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.sequences.iter().map(|(n, l)| (n.as_str(), *l))
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn length_of(&self, name: &str) -> Option<u64> {
        self.sequences
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, l)| *l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fai_preserves_order() {
        let fai = "chr2\t30\t6\t60\t61\nchr1\t100\t50\t60\t61\n";
        let index = SequenceIndex::parse_fai(fai).unwrap();
        let names: Vec<_> = index.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["chr2", "chr1"]);
        assert_eq!(index.length_of("chr1"), Some(100));
    }

    #[test]
    fn test_parse_fai_rejects_duplicates() {
        let fai = "chr1\t100\nchr1\t200\n";
        assert!(matches!(
            SequenceIndex::parse_fai(fai),
            Err(IndexError::DuplicateName(name)) if name == "chr1"
        ));
    }

    #[test]
    fn test_parse_fai_reports_line_number() {
        let fai = "chr1\t100\nchr2\tabc\n";
        match SequenceIndex::parse_fai(fai) {
            Err(IndexError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            SequenceIndex::new([("chrM", 0)]),
            Err(IndexError::ZeroLength(_))
        ));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let index = SequenceIndex::parse_fai("\nchr1\t10\n\n").unwrap();
        assert_eq!(index.len(), 1);
    }
}

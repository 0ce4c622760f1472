//! Streaming record filters.
//!
//! Filters see one line at a time and never reorder. Header lines pass
//! through unless the filter explicitly drops them; record lines are kept,
//! rewritten or dropped.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::info;

use super::is_header;

/// Columns of a VCF data line (0-based).
const REF_COLUMN: usize = 3;
const ALT_COLUMN: usize = 4;
const INFO_COLUMN: usize = 7;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed record at line {line}: expected at least {expected} columns")]
    MalformedRecord { line: usize, expected: usize },
}

/// A per-line predicate/rewrite applied by [`filter_records`].
pub trait RecordFilter {
    /// Whether to keep a header line. Kept lines are written verbatim.
    fn keep_header(&self, _line: &str) -> bool {
        true
    }

    /// Keep (possibly rewritten) or drop a record. `line` carries no
    /// trailing newline. `Err` carries the minimum column count the filter
    /// needed.
    fn apply<'a>(&self, line: &'a str) -> Result<Option<Cow<'a, str>>, usize>;
}

/// Drop records whose REF or ALT alleles use anything outside `ACGT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAlleles;

impl StandardAlleles {
    fn is_standard(allele: &str) -> bool {
        !allele.is_empty()
            && allele
                .bytes()
                .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
    }
}

impl RecordFilter for StandardAlleles {
    fn apply<'a>(&self, line: &'a str) -> Result<Option<Cow<'a, str>>, usize> {
        let mut cols = line.split('\t');
        let reference = cols.nth(REF_COLUMN).ok_or(ALT_COLUMN + 1)?;
        let alternate = cols.next().ok_or(ALT_COLUMN + 1)?;

        let keep = Self::is_standard(reference) && alternate.split(',').all(Self::is_standard);
        Ok(keep.then_some(Cow::Borrowed(line)))
    }
}

/// Remove one INFO key from every record and drop the headers declaring it.
#[derive(Debug, Clone)]
pub struct StripInfoField {
    key: String,
    header_prefixes: Vec<String>,
}

impl StripInfoField {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let header_prefixes = vec![format!("##INFO=<ID={},", key)];
        Self {
            key,
            header_prefixes,
        }
    }

    /// Also drop header lines starting with `prefix` (e.g. `##VEP`).
    pub fn drop_header(mut self, prefix: impl Into<String>) -> Self {
        self.header_prefixes.push(prefix.into());
        self
    }

    fn matches_key(&self, entry: &str) -> bool {
        entry == self.key
            || entry
                .strip_prefix(self.key.as_str())
                .is_some_and(|rest| rest.starts_with('='))
    }
}

impl RecordFilter for StripInfoField {
    fn keep_header(&self, line: &str) -> bool {
        !self.header_prefixes.iter().any(|p| line.starts_with(p))
    }

    fn apply<'a>(&self, line: &'a str) -> Result<Option<Cow<'a, str>>, usize> {
        let mut cols: Vec<&str> = line.split('\t').collect();
        let info = *cols.get(INFO_COLUMN).ok_or(INFO_COLUMN + 1)?;

        if !info.split(';').any(|entry| self.matches_key(entry)) {
            return Ok(Some(Cow::Borrowed(line)));
        }

        let kept: Vec<&str> = info
            .split(';')
            .filter(|entry| !entry.is_empty() && !self.matches_key(entry))
            .collect();
        let rewritten = if kept.is_empty() {
            ".".to_string()
        } else {
            kept.join(";")
        };

        cols[INFO_COLUMN] = &rewritten;
        Ok(Some(Cow::Owned(cols.join("\t"))))
    }
}

/// Line counts from one [`filter_records`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub headers: usize,
    pub kept: usize,
    pub rewritten: usize,
    pub dropped: usize,
}

fn open_input(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Stream `input` through `filter` into `output`.
///
/// Inputs ending in `.gz` are decompressed; output is always plain text
/// with one `\n`-terminated line per kept line.
pub fn filter_records(
    input: &Path,
    output: &Path,
    filter: &dyn RecordFilter,
) -> Result<FilterStats, FilterError> {
    let in_err = |source| FilterError::Io {
        path: input.to_path_buf(),
        source,
    };
    let out_err = |source| FilterError::Io {
        path: output.to_path_buf(),
        source,
    };

    let mut reader = open_input(input).map_err(in_err)?;
    let mut writer = BufWriter::new(File::create(output).map_err(out_err)?);
    let mut stats = FilterStats::default();
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(in_err)? == 0 {
            break;
        }
        line_no += 1;
        let content = line.trim_end_matches(['\r', '\n']);

        let emitted = if is_header(content) {
            if !filter.keep_header(content) {
                stats.dropped += 1;
                continue;
            }
            stats.headers += 1;
            Cow::Borrowed(content)
        } else {
            match filter.apply(content) {
                Ok(Some(record)) => {
                    if matches!(record, Cow::Owned(_)) {
                        stats.rewritten += 1;
                    }
                    stats.kept += 1;
                    record
                }
                Ok(None) => {
                    stats.dropped += 1;
                    continue;
                }
                Err(expected) => {
                    return Err(FilterError::MalformedRecord {
                        line: line_no,
                        expected,
                    })
                }
            }
        };

        writer.write_all(emitted.as_bytes()).map_err(out_err)?;
        writer.write_all(b"\n").map_err(out_err)?;
    }

    writer.flush().map_err(out_err)?;
    info!(
        "Filtered {}: {} kept ({} rewritten), {} dropped",
        input.display(),
        stats.kept,
        stats.rewritten,
        stats.dropped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VCF: &str = "##fileformat=VCFv4.1\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"Consequence\">\n\
##VEP=v84\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t10\t.\tA\tG\t.\tPASS\tDP=10;CSQ=x|y\n\
chr1\t20\t.\tN\tG\t.\tPASS\tCSQ=z\n\
chr1\t30\t.\tac\tT,G\t.\tPASS\tDP=3\n\
chr1\t40\t.\tA\tR\t.\tPASS\tDP=4\n\
chr1\t50\t.\tA\t<DEL>\t.\tPASS\tCSQ=q;DP=5\n";

    fn setup(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.vcf");
        fs::write(&input, contents).unwrap();
        (dir, input)
    }

    fn records(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_standard_alleles_drops_nonstandard() {
        let (dir, input) = setup(VCF);
        let out = dir.path().join("out.vcf");

        let stats = filter_records(&input, &out, &StandardAlleles).unwrap();

        assert_eq!(stats.headers, 5);
        assert_eq!(stats.kept, 2);
        assert_eq!(stats.dropped, 3);
        let positions: Vec<_> = records(&out)
            .iter()
            .map(|l| l.split('\t').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(positions, vec!["10", "30"]);
    }

    #[test]
    fn test_strip_info_field() {
        let (dir, input) = setup(VCF);
        let out = dir.path().join("out.vcf");
        let filter = StripInfoField::new("CSQ").drop_header("##VEP");

        let stats = filter_records(&input, &out, &filter).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(!text.contains("ID=CSQ"));
        assert!(!text.contains("##VEP"));
        assert!(text.contains("##INFO=<ID=DP"));
        assert_eq!(stats.rewritten, 3);

        let info: Vec<_> = records(&out)
            .iter()
            .map(|l| l.split('\t').nth(7).unwrap().to_string())
            .collect();
        assert_eq!(info, vec!["DP=10", ".", "DP=3", "DP=4", "DP=5"]);
    }

    #[test]
    fn test_strip_does_not_touch_similar_keys() {
        let filter = StripInfoField::new("CSQ");
        let line = "chr1\t1\t.\tA\tG\t.\tPASS\tCSQX=1;CSQ";
        let out = filter.apply(line).unwrap().unwrap();
        assert_eq!(out, "chr1\t1\t.\tA\tG\t.\tPASS\tCSQX=1");
    }

    #[test]
    fn test_filters_are_idempotent() {
        let (dir, input) = setup(VCF);
        let filters: Vec<Box<dyn RecordFilter>> = vec![
            Box::new(StandardAlleles),
            Box::new(StripInfoField::new("CSQ").drop_header("##VEP")),
        ];

        for (i, filter) in filters.iter().enumerate() {
            let once = dir.path().join(format!("once{}.vcf", i));
            let twice = dir.path().join(format!("twice{}.vcf", i));
            filter_records(&input, &once, filter.as_ref()).unwrap();
            filter_records(&once, &twice, filter.as_ref()).unwrap();
            assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());
        }
    }

    #[test]
    fn test_gzip_input() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.vcf.gz");
        let mut encoder = GzEncoder::new(File::create(&input).unwrap(), Compression::default());
        encoder.write_all(VCF.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let out = dir.path().join("out.vcf");
        let stats = filter_records(&input, &out, &StandardAlleles).unwrap();
        assert_eq!(stats.kept, 2);
    }

    #[test]
    fn test_short_record_is_malformed() {
        let (dir, input) = setup("#h\nchr1\t1\t.\n");
        let out = dir.path().join("out.vcf");
        assert!(matches!(
            filter_records(&input, &out, &StandardAlleles),
            Err(FilterError::MalformedRecord { line: 2, .. })
        ));
    }
}

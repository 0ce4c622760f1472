//! Concatenation of per-block outputs into a single artifact.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Nothing to merge: input list is empty")]
    Empty,
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MergeError + '_ {
    move |source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Merge VCF files, keeping the `#` header of the first file only.
pub fn merge<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<PathBuf, MergeError> {
    merge_with(inputs, output, super::is_header)
}

/// Merge `inputs` into `output` in the given order.
///
/// The first file is copied verbatim, so its header is written once. Lines
/// matching `is_header` are dropped from every later file wherever they
/// appear.
pub fn merge_with<P, F>(inputs: &[P], output: &Path, is_header: F) -> Result<PathBuf, MergeError>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    if inputs.is_empty() {
        return Err(MergeError::Empty);
    }

    let out_file = File::create(output).map_err(io_error(output))?;
    let mut writer = BufWriter::new(out_file);

    for (i, input) in inputs.iter().enumerate() {
        let input = input.as_ref();
        let file = File::open(input).map_err(io_error(input))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut in_header = true;
        let mut records = 0usize;

        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(io_error(input))?;
            if read == 0 {
                break;
            }

            let header = is_header(line.trim_end_matches(['\r', '\n']));
            if i > 0 && header {
                continue;
            }
            if in_header && header {
                write_line(&mut writer, &line).map_err(io_error(output))?;
                continue;
            }
            in_header = false;

            write_line(&mut writer, &line).map_err(io_error(output))?;
            records += 1;
        }

        debug!("Merged {} records from {}", records, input.display());
    }

    writer.flush().map_err(io_error(output))?;
    Ok(output.to_path_buf())
}

/// Write `line`, terminating it if the source file did not.
fn write_line<W: Write>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    if !line.ends_with('\n') {
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn part(tag: &str, records: usize) -> String {
        let mut s = format!("##fileformat=VCFv4.1\n#CHROM\tPOS\t{}\n", tag);
        for r in 0..records {
            s.push_str(&format!("chr1\t{}\t{}\n", r + 1, tag));
        }
        s
    }

    #[test]
    fn test_single_header_and_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = write(dir.path(), "1.vcf", &part("a", 2));
        let f2 = write(dir.path(), "2.vcf", &part("b", 3));
        let f3 = write(dir.path(), "3.vcf", &part("c", 1));
        let out = dir.path().join("merged.vcf");

        merge(&[&f1, &f2, &f3], &out).unwrap();

        let merged = fs::read_to_string(&out).unwrap();
        let lines: Vec<_> = merged.lines().collect();
        assert_eq!(lines.len(), 2 + 2 + 3 + 1);
        assert_eq!(lines[0], "##fileformat=VCFv4.1");
        assert_eq!(lines[1], "#CHROM\tPOS\ta");
        assert_eq!(lines.iter().filter(|l| l.starts_with('#')).count(), 2);
        let tags: Vec<_> = lines[2..]
            .iter()
            .map(|l| l.rsplit('\t').next().unwrap())
            .collect();
        assert_eq!(tags, vec!["a", "a", "b", "b", "b", "c"]);
    }

    #[test]
    fn test_empty_input_list() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = Vec::new();
        assert!(matches!(
            merge(&inputs, &dir.path().join("out.vcf")),
            Err(MergeError::Empty)
        ));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.vcf");
        match merge(&[&missing], &dir.path().join("out.vcf")) {
            Err(MergeError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_header_only_files_and_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = write(dir.path(), "1.vcf", "#h\n");
        let f2 = write(dir.path(), "2.vcf", "#h\nr1");
        let f3 = write(dir.path(), "3.vcf", "#h\nr2\n");
        let out = dir.path().join("out.vcf");

        merge(&[f1, f2, f3], &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "#h\nr1\nr2\n");
    }

    #[test]
    fn test_later_files_drop_header_lines_after_records() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = write(dir.path(), "1.vcf", "#h\nr1\n");
        let f2 = write(dir.path(), "2.vcf", "#h\nr2\n#late\nr3\n");
        let out = dir.path().join("out.vcf");

        merge(&[f1, f2], &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "#h\nr1\nr2\nr3\n");
    }

    #[test]
    fn test_custom_header_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = write(dir.path(), "1.txt", "@HD\n@SQ\nx\n");
        let f2 = write(dir.path(), "2.txt", "@HD\ny\n");
        let out = dir.path().join("out.txt");

        merge_with(&[f1, f2], &out, |l| l.starts_with('@')).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "@HD\n@SQ\nx\ny\n");
    }
}

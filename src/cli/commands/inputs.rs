//! Tumor/normal input management.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use console::style;

use super::open_repository;
use crate::config::Settings;
use crate::models::PairInput;
use crate::repository::StatusStore;

/// Parse a tab-separated inputs table with a header row.
pub fn read_inputs(path: &Path) -> anyhow::Result<Vec<PairInput>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut inputs = Vec::new();
    for (i, row) in reader.deserialize::<PairInput>().enumerate() {
        // Header is line 1.
        let row = row.with_context(|| format!("{}: bad row at line {}", path.display(), i + 2))?;
        inputs.push(row);
    }
    Ok(inputs)
}

pub async fn cmd_import(settings: &Settings, file: &Path) -> anyhow::Result<ExitCode> {
    let inputs = read_inputs(file)?;
    let repo = open_repository(settings).await?;
    let inserted = repo.import_inputs(&inputs).await?;

    println!(
        "{} Imported {} of {} inputs ({} already present)",
        style("✓").green(),
        inserted,
        inputs.len(),
        inputs.len() - inserted
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn cmd_pending(settings: &Settings, limit: Option<i64>) -> anyhow::Result<ExitCode> {
    let repo = open_repository(settings).await?;
    let pending = repo.pending_inputs(limit).await?;

    if pending.is_empty() {
        println!("{} No pending inputs", style("✓").green());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<20} {:<20} {:<24} {:<24}",
        style("ID").bold(),
        style("CASE").bold(),
        style("TUMOR").bold(),
        style("NORMAL").bold()
    );
    for input in &pending {
        println!(
            "{:<20} {:<20} {:<24} {:<24}",
            input.id, input.case_id, input.tumor_id, input.normal_id
        );
    }
    println!("\n{} pending", pending.len());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv");
        std::fs::write(
            &path,
            "id\tcase_id\ttumor_id\tnormal_id\ttumor_url\tnormal_url\n\
             1\tcase-a\tT1\tN1\ts3://b/T1.bam\ts3://b/N1.bam\n\
             2\tcase-b\tT2\tN2\ts3://b/T2.bam\ts3://b/N2.bam\n",
        )
        .unwrap();

        let inputs = read_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].tumor_id, "T2");
        assert_eq!(inputs[0].normal_url, "s3://b/N1.bam");
    }

    #[test]
    fn test_read_inputs_reports_bad_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv");
        std::fs::write(
            &path,
            "id\tcase_id\ttumor_id\tnormal_id\ttumor_url\tnormal_url\n1\tcase-a\tT1\n",
        )
        .unwrap();

        let err = read_inputs(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}

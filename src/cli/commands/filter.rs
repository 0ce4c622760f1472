//! VCF record filtering.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use clap::Args;
use console::style;

use crate::vcf::{filter_records, RecordFilter, StandardAlleles, StripInfoField};

#[derive(Args)]
pub struct FilterArgs {
    /// Input VCF (.vcf or .vcf.gz)
    input: PathBuf,
    /// Output VCF (plain text)
    output: PathBuf,

    /// Drop records whose REF or ALT contain anything but A, C, G, T
    #[arg(long, conflicts_with = "strip_info")]
    standard_alleles: bool,

    /// Remove KEY=... entries from the INFO column and its header line
    #[arg(long, value_name = "KEY")]
    strip_info: Option<String>,

    /// Extra header prefix to drop with --strip-info, e.g. "##VEP"
    #[arg(long, value_name = "PREFIX", requires = "strip_info")]
    drop_header: Vec<String>,
}

pub fn cmd_filter(args: FilterArgs) -> anyhow::Result<ExitCode> {
    let filter: Box<dyn RecordFilter> = match &args.strip_info {
        Some(key) => Box::new(
            args.drop_header
                .iter()
                .fold(StripInfoField::new(key.clone()), |f, prefix| {
                    f.drop_header(prefix.clone())
                }),
        ),
        None if args.standard_alleles => Box::new(StandardAlleles),
        None => bail!("Choose a filter: --standard-alleles or --strip-info KEY"),
    };

    let stats = filter_records(&args.input, &args.output, filter.as_ref())?;
    println!(
        "{} {} -> {}",
        style("✓").green(),
        args.input.display(),
        args.output.display()
    );
    println!(
        "  {} header lines, {} records kept ({} rewritten), {} dropped",
        stats.headers, stats.kept, stats.rewritten, stats.dropped
    );
    Ok(ExitCode::SUCCESS)
}

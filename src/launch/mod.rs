//! Launch script generation.
//!
//! Templates use `XX_KEY_XX` placeholders. Rendering refuses to produce a
//! script while any placeholder is unbound.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::PairInput;

/// Built-in SLURM batch template.
pub const SLURM_TEMPLATE: &str = include_str!("template.sh");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"XX_([A-Z0-9][A-Z0-9_]*?)_XX").unwrap());

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template has unbound placeholders: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Placeholder keys used by `template`, without the `XX_`/`_XX` markers.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute every `XX_KEY_XX` in `template` with `bindings[KEY]`.
pub fn render(template: &str, bindings: &BTreeMap<String, String>) -> Result<String, RenderError> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|key| !bindings.contains_key(key))
        .collect();
    if !missing.is_empty() {
        return Err(RenderError::MissingKeys(missing));
    }

    for key in bindings.keys() {
        if !template.contains(&format!("XX_{}_XX", key)) {
            debug!("Binding {} is not used by the template", key);
        }
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            bindings.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Per-run settings shared by every generated script.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub thread_count: usize,
    pub mem: String,
    pub block_size: u64,
    pub partition: Option<String>,
    pub config_path: PathBuf,
    pub scratch: PathBuf,
    pub varscan_bin: String,
}

/// Bindings for one input pair.
pub fn bindings_for(input: &PairInput, settings: &LaunchSettings) -> BTreeMap<String, String> {
    let partition = settings
        .partition
        .as_ref()
        .map(|p| format!("#SBATCH --partition={}", p))
        .unwrap_or_default();

    BTreeMap::from([
        ("JOB_NAME".to_string(), format!("varscan.{}", input.id)),
        ("INPUT_ID".to_string(), input.id.clone()),
        ("CASEID".to_string(), input.case_id.clone()),
        ("TID".to_string(), input.tumor_id.clone()),
        ("NID".to_string(), input.normal_id.clone()),
        ("THREAD_COUNT".to_string(), settings.thread_count.to_string()),
        ("MEM".to_string(), settings.mem.clone()),
        ("BLOCKSIZE".to_string(), settings.block_size.to_string()),
        ("PARTITION".to_string(), partition),
        ("CONFIG".to_string(), settings.config_path.display().to_string()),
        (
            "SCRATCH".to_string(),
            settings.scratch.join(&input.id).display().to_string(),
        ),
        ("VARSCAN_BIN".to_string(), settings.varscan_bin.clone()),
    ])
}

/// Write one `varscan.<input id>.sh` per input into `outdir`.
pub fn generate(
    template: &str,
    inputs: &[PairInput],
    settings: &LaunchSettings,
    outdir: &Path,
) -> Result<Vec<PathBuf>, RenderError> {
    std::fs::create_dir_all(outdir).map_err(|source| RenderError::Io {
        path: outdir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let script = render(template, &bindings_for(input, settings))?;
        let path = outdir.join(format!("varscan.{}.sh", input.id));
        std::fs::write(&path, script).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

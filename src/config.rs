//! Settings loaded from `varscan.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::repository::util::is_postgres_url;
use crate::transfer::{AwsCliTransfer, ProfileRule, TransferRouter};

/// Default config filename looked up in the working directory.
pub const CONFIG_FILENAME: &str = "varscan.toml";

/// Default block size in bases.
pub const DEFAULT_BLOCK_SIZE: u64 = 30_000_000;

/// Default number of concurrent block tasks.
pub const DEFAULT_CONCURRENCY: usize = 8;

const DEFAULT_DATABASE_FILENAME: &str = "varscan.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Cannot expand {value:?}: {message}")]
    Expand { value: String, message: String },
    #[error("Invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Credentials and endpoints for object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub aws_command: String,
    pub default_profile: Option<String>,
    pub default_endpoint: Option<String>,
    /// Locator prefix rules. The longest matching prefix wins.
    pub profiles: Vec<ProfileRule>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            aws_command: "aws".to_string(),
            default_profile: None,
            default_endpoint: None,
            profiles: Vec::new(),
        }
    }
}

impl TransferSettings {
    pub fn build(&self) -> TransferRouter {
        TransferRouter::new(AwsCliTransfer::new(
            self.aws_command.clone(),
            self.default_profile.clone(),
            self.default_endpoint.clone(),
            self.profiles.clone(),
        ))
    }
}

/// How each block is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Workflow engine executable, e.g. `cwltool`.
    pub runner: String,
    pub runner_args: Vec<String>,
    /// Workflow description passed to the runner before the input document.
    pub path: Option<PathBuf>,
    /// Wrapper such as `["/usr/bin/time", "-v"]` whose report is parsed
    /// from stderr.
    pub time_command: Vec<String>,
    /// Run once per downloaded input before compute, e.g.
    /// `["samtools", "index", "{input}"]`. Empty to skip.
    pub index_command: Vec<String>,
    /// Logical output streams. Each block writes `<prefix>.<stream>.vcf`.
    pub streams: Vec<String>,
    /// Copied verbatim into every block's input document.
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub tool_versions: BTreeMap<String, String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            runner: "cwltool".to_string(),
            runner_args: Vec::new(),
            path: None,
            time_command: Vec::new(),
            index_command: Vec::new(),
            streams: vec!["snp".to_string(), "indel".to_string()],
            parameters: BTreeMap::new(),
            tool_versions: BTreeMap::new(),
        }
    }
}

/// Reference genome files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    /// FASTA index (`.fai`) that drives partitioning.
    pub index: Option<PathBuf>,
    pub fasta: Option<PathBuf>,
    pub dict: Option<PathBuf>,
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Status store URL. A plain path is a SQLite file.
    pub database_url: Option<String>,
    /// Base directory for per-job scratch space.
    pub scratch_root: PathBuf,
    pub block_size: u64,
    pub concurrency: usize,
    /// Remote prefix results are uploaded under.
    pub output_root: Option<String>,
    pub transfer: TransferSettings,
    pub workflow: WorkflowSettings,
    /// Argv run once per merged stream; `{input}`, `{output}`, `{stream}`
    /// and `{job_id}` are substituted.
    pub finalize: Option<Vec<String>>,
    pub reference: ReferenceSettings,

    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            scratch_root: std::env::temp_dir().join("varscan"),
            block_size: DEFAULT_BLOCK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            output_root: None,
            transfer: TransferSettings::default(),
            workflow: WorkflowSettings::default(),
            finalize: None,
            reference: ReferenceSettings::default(),
            source_path: None,
        }
    }
}

impl Settings {
    /// Load from `path`, or `./varscan.toml` if present, or defaults.
    /// `DATABASE_URL` overrides the file's `database_url`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) => Self::load_from_path(p)?,
            None => {
                let local = PathBuf::from(CONFIG_FILENAME);
                if local.exists() {
                    Self::load_from_path(&local)?
                } else {
                    debug!("No {} found, using defaults", CONFIG_FILENAME);
                    Self::default()
                }
            }
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                settings.database_url = Some(url);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        settings.resolve_paths(&base_dir)?;
        settings.source_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Expand `~` and `$VARS`, then anchor relative paths at `base_dir`.
    fn resolve_paths(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        self.scratch_root = resolve_path(&self.scratch_root, base_dir)?;
        for path in [
            &mut self.reference.index,
            &mut self.reference.fasta,
            &mut self.reference.dict,
            &mut self.workflow.path,
        ]
        .into_iter()
        .flatten()
        {
            *path = resolve_path(path, base_dir)?;
        }

        if let Some(url) = &self.database_url {
            if !is_postgres_url(url) {
                let raw = url.strip_prefix("sqlite:").unwrap_or(url);
                let resolved = resolve_path(Path::new(raw), base_dir)?;
                self.database_url = Some(resolved.display().to_string());
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid {
                key: "block_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.workflow.streams.is_empty() {
            return Err(ConfigError::Invalid {
                key: "workflow.streams",
                message: "at least one output stream is required".to_string(),
            });
        }
        Ok(())
    }

    /// Status store URL, defaulting to a SQLite file under `scratch_root`.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => self
                .scratch_root
                .join(DEFAULT_DATABASE_FILENAME)
                .display()
                .to_string(),
        }
    }

    /// SHA-256 of the serialized settings, logged with each job.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Expand a path that may contain `~` or environment variables. Relative
/// results are joined onto `base_dir`.
pub fn resolve_path(path: &Path, base_dir: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| ConfigError::Expand {
        value: raw.to_string(),
        message: e.to_string(),
    })?;
    let expanded = Path::new(expanded.as_ref());

    Ok(if expanded.is_absolute() {
        expanded.to_path_buf()
    } else {
        base_dir.join(expanded)
    })
}

use crate::exclusion::ExclusionList;
use crate::policy::ChunkingPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Default external worker timeout in seconds
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Logical grouping label stamped on every entity
    pub context: Option<String>,
    /// Worker threads for the ingest pipeline
    pub workers: Option<usize>,
    pub chunking: ChunkingPolicy,
    pub external: ExternalConfig,
    pub exclusions: ExclusionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExternalConfig {
    /// Run the out-of-process Python strategy at all
    pub enabled: bool,
    /// Interpreter to run; looked up on the PATH when unset
    pub python: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            python: None,
            timeout_secs: DEFAULT_EXTERNAL_TIMEOUT_SECS,
        }
    }
}

/// Extra excluded file names and globs, on top of the built-in list
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ExclusionConfig {
    pub names: Vec<String>,
    pub patterns: Vec<String>,
}

impl IngestConfig {
    /// Worker count, defaulting to available parallelism capped at 8
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_DEFAULT_WORKERS),
        }
    }

    pub fn exclusion_list(&self) -> ExclusionList {
        ExclusionList::new(&self.exclusions.names, &self.exclusions.patterns)
    }

    /// Check values that would make the chunking policy meaningless
    pub fn validate(&self) -> crate::Result<()> {
        let min_ceiling = crate::policy::TRUNCATION_MARKER.len() + 1;
        if self.chunking.content_ceiling < min_ceiling {
            return Err(crate::Error::Config(format!(
                "chunking.content_ceiling must be at least {}",
                min_ceiling
            )));
        }
        if self.chunking.max_depth == 0 {
            return Err(crate::Error::Config("chunking.max_depth must be at least 1".to_string()));
        }
        if self.external.timeout_secs == 0 {
            return Err(crate::Error::Config("external.timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("codeweave.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<IngestConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: IngestConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &IngestConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

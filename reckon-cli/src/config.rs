use anyhow::{bail, Context, Result};
use reckon_core::ReckonConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_reckon_home;

/// `config.toml`: run settings plus the engine sections
/// (`[segmenter]`, `[layouts.*]`, `[classifier]`, `[reconciliation]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunSection,
    #[serde(flatten)]
    pub engine: ReckonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Files processed at once; defaults to the number of CPUs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            jobs: None,
            timeout_secs: 120,
            output_dir: PathBuf::from("output"),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_reckon_home()?.join("config.toml"))
}

/// Load `explicit`, which must exist, or the default config file if present.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let p = match explicit {
        Some(p) => {
            if !p.exists() {
                bail!("config not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => {
            let p = config_path()?;
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };
    read_config(&p)
}

pub fn read_config(p: &Path) -> Result<Config> {
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    let cfg = toml::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
    tracing::debug!(path = %p.display(), "loaded config");
    Ok(cfg)
}

pub fn save_config(p: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

/// Write the defaults to `target` (or `~/.reckon/config.toml`) unless a file is there.
pub fn init_config(target: Option<&Path>, force: bool) -> Result<PathBuf> {
    let p = match target {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if p.exists() && !force {
        println!("Config already exists: {}", p.display());
        return Ok(p);
    }
    save_config(&p, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(p)
}

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `~/.reckon`, or `$RECKON_HOME` when set.
pub fn reckon_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RECKON_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".reckon"))
}

pub fn ensure_reckon_home() -> Result<PathBuf> {
    let dir = reckon_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

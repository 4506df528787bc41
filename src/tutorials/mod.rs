//! File-backed tutorial and section lookup.
//!
//! Layout: `<data>/<tutorial>/metadata.json` and `<data>/<tutorial>/<section>.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;

#[derive(Debug, Clone)]
pub struct TutorialStore {
    data_dir: PathBuf,
}

impl TutorialStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data dir: {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub async fn tutorial(&self, id: &str) -> Result<Option<Value>> {
        if !is_plain_id(id) {
            return Ok(None);
        }
        read_json(&self.data_dir.join(id).join("metadata.json")).await
    }

    /// First tutorial (in name order) that holds `<id>.json`.
    pub async fn section(&self, id: &str) -> Result<Option<Value>> {
        if !is_plain_id(id) {
            return Ok(None);
        }
        for tutorial in self.tutorial_dirs().await? {
            if let Some(value) = read_json(&tutorial.join(format!("{id}.json"))).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn tutorial_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut rd = fs::read_dir(&self.data_dir)
            .await
            .with_context(|| format!("listing data dir: {}", self.data_dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Rejects ids that could step outside the data directory.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
        && !id.contains("..")
}

async fn read_json(path: &Path) -> Result<Option<Value>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

//! Ephemeral script files: one per session, plus a periodic sweep of leftovers.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use tokio::{io::AsyncWriteExt, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
    retention: Duration,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating scratch dir: {}", dir.display()))?;
        Ok(Self { dir, retention })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `source` to a fresh, uniquely named file.
    pub async fn write(&self, source: &str) -> Result<ScriptFile> {
        let path = self.dir.join(format!("python_script_{}.py", Uuid::new_v4()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("creating script file: {}", path.display()))?;
        // Dropping the handle on a failed write deletes the partial file.
        let script = ScriptFile { path, removed: false };
        file.write_all(source.as_bytes())
            .await
            .with_context(|| format!("writing script file: {}", script.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("writing script file: {}", script.path.display()))?;
        Ok(script)
    }

    /// Removes files whose mtime is older than the retention window.
    pub fn sweep(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= self.retention || !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep stale script"),
            }
        }
        Ok(removed)
    }

    /// Runs `sweep` every `every`, first tick one interval from now.
    pub fn spawn_sweeper(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut ticker = tokio::time::interval_at(start, every);
            loop {
                ticker.tick().await;
                let store = self.clone();
                match tokio::task::spawn_blocking(move || store.sweep()).await {
                    Ok(Ok(0)) => debug!("scratch sweep found nothing stale"),
                    Ok(Ok(n)) => info!(removed = n, "scratch sweep removed stale scripts"),
                    Ok(Err(e)) => warn!(error = %e, "scratch sweep failed"),
                    Err(e) => warn!(error = %e, "scratch sweep task panicked"),
                }
            }
        })
    }
}

/// A script on disk. Removed exactly once: by `remove`, or on drop.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
    removed: bool,
}

impl ScriptFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. Failures are logged and swallowed.
    pub fn remove(mut self) {
        self.delete();
    }

    fn delete(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "error removing temp file");
        }
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        self.delete();
    }
}

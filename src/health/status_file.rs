//! Health state mirrored to a file for command-based orchestrator checks
//!
//! The file lives in a directory only the supervisor can write. Updates go
//! through a freshly created temporary sibling with an unpredictable name,
//! so nothing another user planted beforehand is ever written to or renamed
//! into place.

use super::HealthState;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory (mode 0755) if it does not exist yet
    pub fn ensure_dir(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(dir),
            _ => Ok(()),
        }
    }

    /// Replace the file contents atomically
    ///
    /// The temporary file is opened with `O_CREAT | O_EXCL`, which fails on
    /// any existing entry including a symlink.
    pub async fn write(&self, state: HealthState) -> io::Result<()> {
        let tmp = self.temp_path();
        let result = self.replace_with(&tmp, state).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    async fn replace_with(&self, tmp: &Path, state: HealthState) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(tmp)
            .await?;
        file.write_all(format!("{}\n", state).as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(tmp, &self.path).await
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

/// Read a status file; `Ok(None)` if it does not exist
pub async fn read_status_file(path: &Path) -> io::Result<Option<HealthState>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents
            .parse()
            .map(Some)
            .map_err(|e: String| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

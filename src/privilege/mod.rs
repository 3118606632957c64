//! Privilege dropping for the supervised service
//!
//! Before the service is launched the data directory is created and its
//! whole tree is handed to the unprivileged identity. The service itself is
//! then launched with that uid/gid (see `supervisor::LaunchSpec`).

mod identity;

pub use identity::{Identity, IdentitySpec};

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("Failed to look up user '{0}': {1}")]
    UserLookup(String, nix::Error),

    #[error("Refusing to run the service as root (identity '{0}')")]
    RootIdentity(String),

    #[error("Failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to chown {path} to {uid}:{gid}: {source}")]
    Chown {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// What `prepare` had to do to reach the desired state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnershipReport {
    /// The data directory did not exist and was created
    pub created: bool,
    /// Number of entries whose owner or group was changed
    pub changed: usize,
}

impl OwnershipReport {
    /// True if the tree was already in the desired state
    pub fn is_noop(&self) -> bool {
        !self.created && self.changed == 0
    }
}

/// Ensure `data_dir` exists and is owned by `identity`, recursively
///
/// Entries already owned by `identity` are not touched, so running this on a
/// correct tree is a no-op. Symlinks are re-owned themselves, never followed.
///
/// # Errors
/// Fails on the first entry that cannot be created, read or chowned.
pub fn prepare(data_dir: &Path, identity: &Identity) -> Result<OwnershipReport, PermissionError> {
    let mut report = OwnershipReport::default();

    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir).map_err(|source| PermissionError::CreateDir {
            path: data_dir.to_path_buf(),
            source,
        })?;
        report.created = true;
    }

    let uid = identity.uid.as_raw();
    let gid = identity.gid.as_raw();

    for entry in WalkDir::new(data_dir).follow_links(false) {
        let entry = entry.map_err(|source| PermissionError::Walk {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let metadata = entry.metadata().map_err(|source| PermissionError::Walk {
            path: entry.path().to_path_buf(),
            source,
        })?;

        if metadata.uid() == uid && metadata.gid() == gid {
            continue;
        }

        std::os::unix::fs::lchown(entry.path(), Some(uid), Some(gid)).map_err(|source| {
            PermissionError::Chown {
                path: entry.path().to_path_buf(),
                uid,
                gid,
                source,
            }
        })?;
        debug!(path = %entry.path().display(), "Changed ownership");
        report.changed += 1;
    }

    info!(
        data_dir = %data_dir.display(),
        identity = %identity,
        created = report.created,
        changed = report.changed,
        "Data directory prepared"
    );

    Ok(report)
}

#[cfg(test)]
#[path = "privilege_test.rs"]
mod tests;

//! Moving recovered cache trees into place
//!
//! Builder output is often owned by root, so destination removal first goes
//! through a privileged command and falls back to an unprivileged delete.

use crate::error::{DanceError, DanceResult};
use crate::orchestration::{run, CommandLine};
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Remove a file or directory tree; a missing path is not an error
pub(crate) async fn remove_tree(path: &Path) -> io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match removed {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Deletes relocation destinations
#[derive(Debug, Clone)]
pub struct DestinationRemover {
    privileged: Option<CommandLine>,
}

impl DestinationRemover {
    /// `privileged_command` is an argv prefix such as `["sudo", "-n"]`; an
    /// empty prefix disables privileged removal
    pub fn new(privileged_command: &[String]) -> Self {
        let privileged = if running_as_root() {
            None
        } else {
            CommandLine::from_prefix("transfer.privileged_command", privileged_command).ok()
        };
        Self { privileged }
    }

    /// Remover that always tries `command` first, even as root
    pub fn with_privileged(command: CommandLine) -> Self {
        Self {
            privileged: Some(command),
        }
    }

    /// Remover that never escalates
    pub fn unprivileged() -> Self {
        Self { privileged: None }
    }

    /// Remove `path` entirely
    pub async fn remove(&self, path: &Path) -> DanceResult<()> {
        if let Some(prefix) = &self.privileged {
            let cmd = prefix
                .clone()
                .args(["rm", "-rf"])
                .arg(path.display().to_string());
            match run(&cmd).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    "Privileged removal of {} failed, retrying without: {}",
                    path.display(),
                    e
                ),
            }
        }

        remove_tree(path)
            .await
            .map_err(|e| DanceError::relocation(path, format!("cannot remove destination: {}", e)))
    }
}

/// Replace `dest` with the recovered tree at `staged`
///
/// A missing `staged` tree means the cache was empty and leaves an empty
/// `dest` directory behind.
pub async fn relocate_extracted(
    staged: &Path,
    dest: &Path,
    remover: &DestinationRemover,
) -> DanceResult<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DanceError::relocation(dest, format!("cannot create parent: {}", e)))?;
    }

    remover.remove(dest).await?;

    match tokio::fs::rename(staged, dest).await {
        Ok(()) => {
            debug!("Moved {} to {}", staged.display(), dest.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No data recovered for {}, leaving it empty", dest.display());
            tokio::fs::create_dir_all(dest)
                .await
                .map_err(|e| DanceError::relocation(dest, e.to_string()))
        }
        Err(e) => Err(DanceError::relocation(
            dest,
            format!("cannot move {} into place: {}", staged.display(), e),
        )),
    }
}

/// Delete an injected host directory; failures are logged, not returned
pub async fn discard_source(source: &Path) {
    if let Err(e) = remove_tree(source).await {
        warn!("Could not remove injected source {}: {}", source.display(), e);
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use miette::{Context, IntoDiagnostic};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    types::SourceId,
};

/// Minimum free space in the target directory before a fetch is allowed.
/// A fetch interrupted by a full disk leaves a corrupt partial file behind.
pub const MIN_FREE_SPACE_MB: u64 = 1000;

/// Create (if needed) and return the artifact directory for one source,
/// `<root>/<source-id>/`.
pub fn ensure_video_dir(root: &Path, id: &SourceId) -> Result<PathBuf> {
    let dir = root.join(id.as_str());
    fs::create_dir_all(&dir)
        .into_diagnostic()
        .wrap_err("Could not create video directory")?;
    Ok(dir)
}

/// Fail fast when the target volume is low on space.
///
/// The check is advisory: it races with the write that follows, and when
/// the free-space query itself fails the fetch proceeds anyway.
pub fn check_free_space(dir: &Path) -> Result<()> {
    match fs2::available_space(dir) {
        Ok(bytes) => {
            let available_mb = bytes / (1024 * 1024);
            if available_mb < MIN_FREE_SPACE_MB {
                return Err(Error::InsufficientDiskSpace {
                    available_mb,
                    required_mb: MIN_FREE_SPACE_MB,
                });
            }
            debug!("Disk space check passed: {available_mb} MB available");
            Ok(())
        }
        Err(err) => {
            warn!("Could not check disk space: {err}");
            Ok(())
        }
    }
}

/// The idempotency check: a non-empty file at the artifact path is taken
/// as complete. Content is never verified, so a partial file left by a
/// crashed run passes too.
pub fn artifact_exists(path: &Path) -> bool {
    path.metadata().map(|meta| meta.len() > 0).unwrap_or(false)
}

/// Find the file the fetch tool actually produced: same directory, same
/// stem, an extension of the tool's choosing.
pub fn find_with_prefix(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| file_name_starts_with(path, prefix))
}

/// Removes every file carrying the scratch prefix when dropped, keeping
/// only the final artifact. Runs on success, failure, and unwind alike.
pub struct ScratchFiles {
    dir: PathBuf,
    prefix: String,
    keep: PathBuf,
}

impl ScratchFiles {
    pub fn new(dir: &Path, prefix: &str, keep: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_owned(),
            keep: keep.to_path_buf(),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };

        for path in entries.flatten().map(|entry| entry.path()) {
            if path == self.keep || !file_name_starts_with(&path, &self.prefix) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed scratch file {}", path.display()),
                Err(err) => warn!("Could not remove scratch file {}: {err}", path.display()),
            }
        }
    }
}

fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(prefix))
}

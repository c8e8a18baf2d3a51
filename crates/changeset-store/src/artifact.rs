// ABOUTME: Durable package artifact writes using temp file, fsync, and atomic rename.
// ABOUTME: A crash mid-write never leaves a truncated <name>.xml behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while writing a package artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the artifact for `package_name` lives in `dir`.
pub fn artifact_path(dir: &Path, package_name: &str) -> PathBuf {
    dir.join(format!("{}.xml", package_name))
}

/// Write `contents` as `<dir>/<package_name>.xml`, replacing any existing
/// file of that name. Creates `dir` if it does not exist.
pub fn write_artifact(
    dir: &Path,
    package_name: &str,
    contents: &str,
) -> Result<PathBuf, ArtifactError> {
    let final_path = artifact_path(dir, package_name);
    let tmp_path = dir.join(format!("{}.xml.tmp", package_name));

    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut file = File::create(&tmp_path).map_err(io_error(&tmp_path))?;
    file.write_all(contents.as_bytes()).map_err(io_error(&tmp_path))?;
    file.sync_all().map_err(io_error(&tmp_path))?;
    drop(file);

    if let Err(source) = fs::rename(&tmp_path, &final_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ArtifactError::Io {
            path: final_path,
            source,
        });
    }

    // Best-effort: the rename already succeeded, so a failed directory fsync
    // only weakens durability of the directory entry.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(final_path)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError {
    let path = path.to_path_buf();
    move |source| ArtifactError::Io { path, source }
}

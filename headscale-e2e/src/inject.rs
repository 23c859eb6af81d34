//! Placing files inside a running container
//!
//! There is no shared filesystem with the container, so a write is:
//! wrap the bytes in a one-file tar archive, `mkdir -p` the parent directory
//! through exec, then upload the archive into that directory.
//!
//! `write_file` is not transactional. If the upload fails after the
//! directory was created, the directory stays and the file is absent.

use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{single_file_archive, ArchiveError};
use crate::exec::{CommandRunner, ExecError};
use crate::runtime::RuntimeError;

/// Errors from injecting or reading back a file
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("invalid container path {0:?}: expected an absolute path to a file")]
    InvalidPath(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to ensure directory {dir}: {source}")]
    EnsureDirectory {
        dir: String,
        #[source]
        source: ExecError,
    },

    #[error("failed to upload {file_name} to {dir}: {source}")]
    Upload {
        dir: String,
        file_name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: ExecError,
    },
}

/// Split an absolute container path into parent directory and file name.
///
/// The directory has no trailing slash unless it is `/`.
pub fn split_path(path: &str) -> Result<(&str, &str), InjectError> {
    let invalid = || InjectError::InvalidPath(path.to_string());

    if !path.starts_with('/') || path.ends_with('/') {
        return Err(invalid());
    }

    let (dir, file_name) = path.rsplit_once('/').ok_or_else(invalid)?;
    if file_name == "." || file_name == ".." {
        return Err(invalid());
    }

    let dir = if dir.is_empty() { "/" } else { dir };
    Ok((dir, file_name))
}

/// Writes and reads files in the container behind a [`CommandRunner`]
pub struct FileInjector<'a> {
    runner: &'a CommandRunner,
}

impl<'a> FileInjector<'a> {
    pub fn new(runner: &'a CommandRunner) -> Self {
        Self { runner }
    }

    /// Write `data` to the absolute `path`, creating parent directories.
    ///
    /// An existing file at `path` is replaced; an existing directory is not.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), InjectError> {
        let (dir, file_name) = split_path(path)?;

        let archive = single_file_archive(file_name, data)?;
        debug!(
            path,
            payload_bytes = data.len(),
            archive_bytes = archive.len(),
            "Built upload archive"
        );

        self.runner
            .execute(&["mkdir", "-p", dir])
            .await
            .map_err(|source| InjectError::EnsureDirectory {
                dir: dir.to_string(),
                source,
            })?;

        self.runner
            .runtime()
            .upload_archive(self.runner.container_id(), dir, archive)
            .await
            .map_err(|source| InjectError::Upload {
                dir: dir.to_string(),
                file_name: file_name.to_string(),
                source,
            })?;

        info!(path, bytes = data.len(), "Wrote file to container");
        Ok(())
    }

    /// Read the exact bytes stored at `path`.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, InjectError> {
        split_path(path)?;

        self.runner
            .execute_raw(&["cat", path])
            .await
            .map_err(|source| InjectError::Read {
                path: path.to_string(),
                source,
            })
    }
}

use crate::drive::{Storage, StorageError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("folder name {0:?} has no filesystem-safe characters")]
    EmptyFolderName(String),
    #[error("invalid image file name {0:?}")]
    InvalidFileName(String),
    #[error("io failed for {path}: {message}")]
    Io { path: String, message: String },
    #[error("download failed: {0}")]
    Storage(#[from] StorageError),
}

impl WorkspaceError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// An image copied into the local scratch directory for the current pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDownload {
    pub path: PathBuf,
    pub sanitized_folder_name: String,
}

/// Keeps ASCII letters, digits, spaces, `-` and `_`, then trims trailing
/// whitespace. Characters are dropped, never replaced.
pub fn sanitize_folder_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn validate_file_name(file_name: &str) -> Result<&str, WorkspaceError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return Err(WorkspaceError::InvalidFileName(file_name.to_string()));
    }
    Ok(trimmed)
}

/// Streams one remote image to `download_root/<sanitized folder>/<file_name>`.
///
/// A partially written file is removed before the error is returned.
pub async fn download_image(
    storage: &dyn Storage,
    download_root: &Path,
    image_id: &str,
    file_name: &str,
    folder_name: &str,
) -> Result<LocalDownload, WorkspaceError> {
    let sanitized = sanitize_folder_name(folder_name);
    if sanitized.is_empty() {
        return Err(WorkspaceError::EmptyFolderName(folder_name.to_string()));
    }
    let file_name = validate_file_name(file_name)?;

    let dir = download_root.join(&sanitized);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| WorkspaceError::io(&dir, err))?;
    let dir = tokio::fs::canonicalize(&dir)
        .await
        .map_err(|err| WorkspaceError::io(&dir, err))?;
    let path = dir.join(file_name);

    match storage.download(image_id, &path).await {
        Ok(bytes) => {
            info!(
                target = "lister.workspace",
                image_id,
                path = %path.display(),
                bytes,
                "image_downloaded"
            );
            Ok(LocalDownload {
                path,
                sanitized_folder_name: sanitized,
            })
        }
        Err(err) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await
                && remove_err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(target = "lister.workspace", path = %path.display(), error = %remove_err, "partial_download_not_removed");
            }
            Err(err.into())
        }
    }
}

/// Deletes the files directly inside `download_root/<sanitized_folder_name>`.
///
/// Subdirectories and the directory itself are left alone, a missing
/// directory is a no-op, and failures are logged rather than returned.
/// Returns how many files were removed.
pub async fn cleanup_download(download_root: &Path, sanitized_folder_name: &str) -> usize {
    if sanitized_folder_name.is_empty() {
        warn!(target = "lister.workspace", "cleanup_skipped_empty_folder_name");
        return 0;
    }
    let dir = download_root.join(sanitized_folder_name);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(target = "lister.workspace", dir = %dir.display(), error = %err, "cleanup_read_dir_failed");
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(target = "lister.workspace", dir = %dir.display(), error = %err, "cleanup_iteration_failed");
                break;
            }
        };
        let is_file = match entry.file_type().await {
            Ok(kind) => kind.is_file(),
            Err(err) => {
                warn!(target = "lister.workspace", path = %entry.path().display(), error = %err, "cleanup_stat_failed");
                continue;
            }
        };
        if !is_file {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(err) => {
                warn!(target = "lister.workspace", path = %entry.path().display(), error = %err, "cleanup_remove_failed")
            }
        }
    }
    info!(target = "lister.workspace", dir = %dir.display(), removed, "local_files_cleaned");
    removed
}

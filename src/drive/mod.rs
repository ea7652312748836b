pub mod auth;
pub mod files;

use crate::config::ImagePolicy;
use crate::http::{Transient, is_transient_status};
use crate::models::{ImageRecord, ProductFolder, RemoteFile};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

pub use auth::DriveAuthError;
pub use files::DriveClient;

pub const IMAGE_MIME_PREFIX: &str = "image/";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("authentication failed: {0}")]
    Auth(#[from] DriveAuthError),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("local io failed: {0}")]
    Io(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Request(err.to_string())
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Auth(err) => err.is_transient(),
            StorageError::Request(_) => true,
            StorageError::Status(status) => is_transient_status(*status),
            StorageError::InvalidResponse(_) | StorageError::Io(_) => false,
        }
    }
}

impl StorageError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            StorageError::Auth(_)
                | StorageError::Status(reqwest::StatusCode::UNAUTHORIZED)
                | StorageError::Status(reqwest::StatusCode::FORBIDDEN)
        )
    }
}

/// Cloud storage capabilities the pipeline depends on.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Child folders of `parent_id`.
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<ProductFolder>, StorageError>;

    /// Child files of `parent_id` whose MIME type starts with `mime_prefix`.
    async fn list_files(
        &self,
        parent_id: &str,
        mime_prefix: &str,
    ) -> Result<Vec<RemoteFile>, StorageError>;

    /// Streams the file content into `dest`, returning the number of bytes written.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, StorageError>;

    async fn parents(&self, file_id: &str) -> Result<Vec<String>, StorageError>;

    /// Adds `add_parent` and removes every id in `remove_parents` in one update.
    async fn reparent(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError>;
}

/// Finds one image per product folder under `root_id`.
///
/// Order follows whatever the storage API returns. Any query error is logged
/// and yields an empty list so a broken listing never aborts the caller.
pub async fn list_image_records(
    storage: &dyn Storage,
    root_id: &str,
    policy: ImagePolicy,
) -> Vec<ImageRecord> {
    match try_list_image_records(storage, root_id, policy).await {
        Ok(records) => records,
        Err(err) => {
            error!(target = "lister.drive", root_id, error = %err, "image_listing_failed");
            Vec::new()
        }
    }
}

async fn try_list_image_records(
    storage: &dyn Storage,
    root_id: &str,
    policy: ImagePolicy,
) -> Result<Vec<ImageRecord>, StorageError> {
    let folders = storage.list_folders(root_id).await?;
    info!(target = "lister.drive", root_id, count = folders.len(), "product_folders_found");

    let mut records = Vec::with_capacity(folders.len());
    for folder in folders {
        let images = storage.list_files(&folder.id, IMAGE_MIME_PREFIX).await?;
        info!(
            target = "lister.drive",
            folder_id = %folder.id,
            folder_name = %folder.name,
            count = images.len(),
            "images_found_in_folder"
        );
        if policy == ImagePolicy::RequireSingle && images.len() > 1 {
            warn!(
                target = "lister.drive",
                folder_id = %folder.id,
                count = images.len(),
                "folder_skipped_multiple_images"
            );
            continue;
        }
        if let Some(image) = images.into_iter().next() {
            records.push(ImageRecord {
                image_id: image.id,
                image_name: image.name,
                folder_id: folder.id,
                folder_name: folder.name,
            });
        }
    }
    Ok(records)
}

/// Replaces every current parent of `folder_id` with `processed_id`.
pub async fn move_folder_to_processed(
    storage: &dyn Storage,
    folder_id: &str,
    processed_id: &str,
) -> Result<Vec<String>, StorageError> {
    let previous = storage.parents(folder_id).await?;
    storage.reparent(folder_id, processed_id, &previous).await?;
    info!(
        target = "lister.drive",
        folder_id,
        processed_id,
        previous_parents = ?previous,
        "folder_moved_to_processed"
    );
    Ok(previous)
}

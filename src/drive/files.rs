use super::auth::{ServiceAccountAuth, ServiceAccountKey};
use super::{Storage, StorageError};
use crate::config::DriveConfig;
use crate::http::{HttpSettings, RetryPolicy, build_client, with_retry};
use crate::models::{ProductFolder, RemoteFile};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use urlencoding::encode;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentsResponse {
    #[serde(default)]
    parents: Vec<String>,
}

/// Storage collaborator backed by the Drive v3 REST API.
pub struct DriveClient {
    http: Client,
    auth: ServiceAccountAuth,
    api_base: String,
    retry: RetryPolicy,
}

impl DriveClient {
    pub async fn connect(config: &DriveConfig) -> Result<Self, StorageError> {
        let key = ServiceAccountKey::from_file(&config.service_account_file).await?;
        Self::with_key(key, &config.http)
    }

    pub fn with_key(key: ServiceAccountKey, settings: &HttpSettings) -> Result<Self, StorageError> {
        let http = build_client(settings);
        let auth = ServiceAccountAuth::new(key, http.clone())?;
        Ok(Self {
            http,
            auth,
            api_base: DRIVE_API_BASE.to_string(),
            retry: settings.retry,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.api_base, encode(file_id))
    }

    async fn query_files(&self, query: &str) -> Result<Vec<RemoteFile>, StorageError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let token = self.auth.access_token().await?;
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", "nextPageToken, files(id, name, mimeType)".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(page) = &page_token {
                params.push(("pageToken", page.clone()));
            }
            let response = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(token)
                .query(&params)
                .send()
                .await?;
            let page: FileListResponse = check_status(response)?
                .json()
                .await
                .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(files)
    }

    async fn verify_access_once(&self) -> Result<Option<RemoteFile>, StorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("pageSize", "1"), ("fields", "files(id, name, mimeType)")])
            .send()
            .await?;
        let page: FileListResponse = check_status(response)?
            .json()
            .await
            .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
        Ok(page.files.into_iter().next())
    }

    /// Authenticates and lists at most one visible file.
    pub async fn verify_access(&self) -> Result<Option<RemoteFile>, StorageError> {
        with_retry("drive", "verify_access", self.retry, || self.verify_access_once()).await
    }

    async fn download_once(&self, file_id: &str, dest: &Path) -> Result<u64, StorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let mut response = check_status(response)?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|err| StorageError::Io(err.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;
        Ok(written)
    }

    async fn parents_once(&self, file_id: &str) -> Result<Vec<String>, StorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("fields", "parents")])
            .send()
            .await?;
        let payload: ParentsResponse = check_status(response)?
            .json()
            .await
            .map_err(|err| StorageError::InvalidResponse(err.to_string()))?;
        Ok(payload.parents)
    }

    async fn reparent_once(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .patch(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[
                ("addParents", add_parent.to_string()),
                ("removeParents", remove_parents.join(",")),
                ("fields", "id, parents".to_string()),
            ])
            .json(&json!({}))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(StorageError::Status(response.status()))
    }
}

/// Drive query string literals are single-quoted with `\` escapes.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub fn folders_query(parent_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType='{FOLDER_MIME_TYPE}' and trashed=false",
        quote(parent_id)
    )
}

pub fn files_query(parent_id: &str, mime_prefix: &str) -> String {
    format!(
        "'{}' in parents and mimeType contains '{}' and trashed=false",
        quote(parent_id),
        quote(mime_prefix)
    )
}

#[async_trait]
impl Storage for DriveClient {
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<ProductFolder>, StorageError> {
        let query = folders_query(parent_id);
        let files = with_retry("drive", "list_folders", self.retry, || {
            self.query_files(&query)
        })
        .await?;
        debug!(target = "lister.drive", parent_id, count = files.len(), "folders_listed");
        Ok(files
            .into_iter()
            .map(|file| ProductFolder {
                id: file.id,
                name: file.name,
            })
            .collect())
    }

    async fn list_files(
        &self,
        parent_id: &str,
        mime_prefix: &str,
    ) -> Result<Vec<RemoteFile>, StorageError> {
        let query = files_query(parent_id, mime_prefix);
        with_retry("drive", "list_files", self.retry, || self.query_files(&query)).await
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, StorageError> {
        with_retry("drive", "download", self.retry, || {
            self.download_once(file_id, dest)
        })
        .await
    }

    async fn parents(&self, file_id: &str) -> Result<Vec<String>, StorageError> {
        with_retry("drive", "parents", self.retry, || self.parents_once(file_id)).await
    }

    async fn reparent(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), StorageError> {
        with_retry("drive", "reparent", self.retry, || {
            self.reparent_once(file_id, add_parent, remove_parents)
        })
        .await
    }
}

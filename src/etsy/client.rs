use super::listing::DraftListing;
use super::{EtsyError, Marketplace};
use crate::config::EtsyConfig;
use crate::http::{RetryPolicy, build_client, with_retry, with_retry_when};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, multipart};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    #[serde(default, alias = "listing_image_id")]
    image_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    listing_id: Option<u64>,
}

/// Marketplace collaborator over the Etsy Open API v3.
pub struct EtsyClient {
    http: Client,
    api_base: String,
    api_key: String,
    shop_id: String,
    access_token: Option<String>,
    retry: RetryPolicy,
}

impl EtsyClient {
    pub fn new(config: &EtsyConfig) -> Self {
        Self {
            http: build_client(&config.http),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            shop_id: config.shop_id.clone(),
            access_token: config.access_token.clone(),
            retry: config.http.retry,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("x-api-key", &self.api_key);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn image_upload_url(&self) -> String {
        format!(
            "{}/shops/{}/listings/images",
            self.api_base,
            urlencoding::encode(&self.shop_id)
        )
    }

    fn listings_url(&self) -> String {
        format!(
            "{}/shops/{}/listings",
            self.api_base,
            urlencoding::encode(&self.shop_id)
        )
    }

    fn attach_url(&self, listing_id: u64, image_id: u64) -> String {
        format!("{}/listings/{listing_id}/images/{image_id}", self.api_base)
    }

    async fn upload_once(
        &self,
        file_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<u64, EtsyError> {
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|err| EtsyError::Request(err.to_string()))?;
        let form = multipart::Form::new().part("image", part);
        let response = self
            .authorize(self.http.post(self.image_upload_url()))
            .multipart(form)
            .send()
            .await
            .map_err(EtsyError::from_send)?;
        debug!(target = "lister.etsy", status = %response.status(), "image_upload_response");
        let payload: ImageUploadResponse = expect_created(response)?
            .json()
            .await
            .map_err(|err| EtsyError::InvalidResponse(err.to_string()))?;
        payload
            .image_id
            .ok_or_else(|| EtsyError::InvalidResponse("no image id in response".into()))
    }

    async fn create_once(&self, listing: &DraftListing) -> Result<u64, EtsyError> {
        let response = self
            .authorize(self.http.post(self.listings_url()))
            .json(listing)
            .send()
            .await
            .map_err(EtsyError::from_send)?;
        debug!(target = "lister.etsy", status = %response.status(), "listing_create_response");
        let payload: ListingResponse = expect_created(response)?
            .json()
            .await
            .map_err(|err| EtsyError::InvalidResponse(err.to_string()))?;
        payload
            .listing_id
            .ok_or_else(|| EtsyError::InvalidResponse("no listing id in response".into()))
    }

    async fn attach_once(&self, listing_id: u64, image_id: u64) -> Result<(), EtsyError> {
        let response = self
            .authorize(self.http.post(self.attach_url(listing_id, image_id)))
            .send()
            .await
            .map_err(EtsyError::from_send)?;
        if !response.status().is_success() {
            return Err(EtsyError::Status(response.status()));
        }
        Ok(())
    }
}

fn expect_created(response: reqwest::Response) -> Result<reqwest::Response, EtsyError> {
    if response.status() == StatusCode::CREATED {
        Ok(response)
    } else {
        Err(EtsyError::Status(response.status()))
    }
}

// Upload and create make a new resource per request, so they are only resent
// when the server cannot have acted on the first one. Attaching is idempotent.
#[async_trait]
impl Marketplace for EtsyClient {
    async fn upload_image(
        &self,
        file_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<u64, EtsyError> {
        with_retry_when(
            "etsy",
            "upload_image",
            self.retry,
            EtsyError::is_safe_to_resend,
            || self.upload_once(file_name, mime, bytes),
        )
        .await
    }

    async fn create_listing(&self, listing: &DraftListing) -> Result<u64, EtsyError> {
        with_retry_when(
            "etsy",
            "create_listing",
            self.retry,
            EtsyError::is_safe_to_resend,
            || self.create_once(listing),
        )
        .await
    }

    async fn attach_image(&self, listing_id: u64, image_id: u64) -> Result<(), EtsyError> {
        with_retry("etsy", "attach_image", self.retry, || {
            self.attach_once(listing_id, image_id)
        })
        .await
    }
}

pub mod client;
pub mod listing;

use crate::http::{Transient, is_transient_status};
use crate::listing::{PriceError, ProductInfo, image_mime};
use crate::models::ListingContent;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub use client::EtsyClient;
pub use listing::{DraftListing, ListingDefaults};

#[derive(Debug, Error)]
pub enum EtsyError {
    /// The connection was never established, so nothing reached the server.
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Transient for EtsyError {
    fn is_transient(&self) -> bool {
        match self {
            EtsyError::Connect(_) | EtsyError::Request(_) => true,
            EtsyError::Status(status) => is_transient_status(*status),
            EtsyError::InvalidResponse(_) => false,
        }
    }
}

impl EtsyError {
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_connect() {
            EtsyError::Connect(err.to_string())
        } else {
            EtsyError::Request(err.to_string())
        }
    }

    /// Whether a call that creates a resource may be sent again. Only a
    /// failed connect, 429 or 503 guarantees the server created nothing.
    pub fn is_safe_to_resend(&self) -> bool {
        matches!(
            self,
            EtsyError::Connect(_)
                | EtsyError::Status(reqwest::StatusCode::TOO_MANY_REQUESTS)
                | EtsyError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            EtsyError::Status(reqwest::StatusCode::UNAUTHORIZED)
                | EtsyError::Status(reqwest::StatusCode::FORBIDDEN)
        )
    }
}

/// Marketplace capabilities used to publish one draft listing.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Uploads image bytes for the shop and returns the image id.
    async fn upload_image(&self, file_name: &str, mime: &str, bytes: &[u8])
    -> Result<u64, EtsyError>;

    async fn create_listing(&self, listing: &DraftListing) -> Result<u64, EtsyError>;

    async fn attach_image(&self, listing_id: u64, image_id: u64) -> Result<(), EtsyError>;
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Price(#[from] PriceError),
    #[error("unable to read image {path}: {message}")]
    ImageRead { path: String, message: String },
    #[error("image upload failed: {0}")]
    Upload(EtsyError),
    #[error("listing creation failed: {0}")]
    Create(EtsyError),
}

impl PublishError {
    pub fn marketplace_error(&self) -> Option<&EtsyError> {
        match self {
            PublishError::Upload(err) | PublishError::Create(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedListing {
    pub listing_id: u64,
    pub image_id: u64,
    pub image_attached: bool,
}

/// Uploads the image, creates a draft listing, then links the two.
///
/// The price is validated before anything is uploaded. A failed image link is
/// logged and reported through `image_attached` but does not fail the publish.
pub async fn publish_listing(
    marketplace: &dyn Marketplace,
    content: &ListingContent,
    image_path: &Path,
    product: &ProductInfo,
    defaults: ListingDefaults,
) -> Result<PublishedListing, PublishError> {
    let price_cents = product.price_cents()?;
    let draft = DraftListing::new(content, product, price_cents, defaults);

    let bytes = tokio::fs::read(image_path)
        .await
        .map_err(|err| PublishError::ImageRead {
            path: image_path.display().to_string(),
            message: err.to_string(),
        })?;
    let file_name = image_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image.jpg");
    let mime = image_mime(image_path);

    let image_id = marketplace
        .upload_image(file_name, &mime, &bytes)
        .await
        .map_err(PublishError::Upload)?;
    info!(target = "lister.etsy", image_id, bytes = bytes.len(), "image_uploaded");

    let listing_id = marketplace
        .create_listing(&draft)
        .await
        .map_err(PublishError::Create)?;
    info!(
        target = "lister.etsy",
        listing_id,
        painting_title = %draft.painting_title,
        price_cents,
        "draft_listing_created"
    );

    let image_attached = match marketplace.attach_image(listing_id, image_id).await {
        Ok(()) => {
            info!(target = "lister.etsy", listing_id, image_id, "image_attached_to_listing");
            true
        }
        Err(err) => {
            warn!(target = "lister.etsy", listing_id, image_id, error = %err, "image_attach_failed");
            false
        }
    };

    Ok(PublishedListing {
        listing_id,
        image_id,
        image_attached,
    })
}

use crate::listing::ProductInfo;
use crate::models::ListingContent;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Fixed listing attributes that come from configuration, not from the
/// product folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingDefaults {
    pub taxonomy_id: u64,
    pub shipping_profile_id: Option<u64>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftListing {
    pub title: String,
    pub description: String,
    /// Minor currency units.
    pub price: u64,
    pub quantity: u32,
    pub who_made: &'static str,
    pub when_made: &'static str,
    pub taxonomy_id: u64,
    pub state: &'static str,
    pub is_supply: bool,
    pub is_customizable: bool,
    pub language: &'static str,
    pub tags: Vec<String>,
    pub shipping_profile_id: Option<u64>,
    /// Kept out of the request body; logged alongside the listing.
    #[serde(skip)]
    pub painting_title: String,
}

impl DraftListing {
    pub fn new(
        content: &ListingContent,
        product: &ProductInfo,
        price_cents: u64,
        defaults: ListingDefaults,
    ) -> Self {
        Self {
            title: content.title.clone(),
            description: content.description.clone(),
            price: price_cents,
            quantity: 1,
            who_made: "i_did",
            when_made: "made_to_order",
            taxonomy_id: defaults.taxonomy_id,
            state: "draft",
            is_supply: false,
            is_customizable: false,
            language: "en",
            tags: content.tags.clone(),
            shipping_profile_id: defaults.shipping_profile_id,
            painting_title: product.painting_title.clone(),
        }
    }
}

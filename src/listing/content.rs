use super::product::ProductInfo;
use crate::llm::{LlmError, VisionModel, VisionRequest};
use crate::models::ListingContent;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_TITLE_CHARS: usize = 140;
pub const REQUIRED_TAGS: usize = 13;
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unable to read image {path}: {message}")]
    ImageRead { path: String, message: String },
    #[error("model request failed: {0}")]
    Model(#[from] LlmError),
    #[error("reply is not valid JSON: {0}")]
    NotJson(String),
    #[error("reply is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),
    #[error("title has {0} characters, limit is 140")]
    TitleTooLong(usize),
    #[error("expected 13 tags, got {0}")]
    TagCount(usize),
}

impl GenerationError {
    /// True when the model answered but the answer broke the listing contract.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            GenerationError::ImageRead { .. } | GenerationError::Model(_)
        )
    }
}

pub fn build_prompt(info: &ProductInfo) -> String {
    format!(
        r#"You are an expert Etsy marketing specialist who creates compelling, search-optimized listings for original artwork and prints.

ANALYZE THIS PAINTING AND CREATE AN ETSY LISTING:

Product Information:
- Original Painting Title: "{title}"
- Art Type: {art_type} (Print or Original)
- Size: {size}
- Price: ${price}

TASK: Create a search-optimized Etsy listing that will help customers find this artwork.

REQUIREMENTS:
1. TITLE (max {MAX_TITLE_CHARS} characters): a compelling, searchable title that includes the painting's subject or style, the art type, the size, and key search terms buyers would use.

2. DESCRIPTION: a detailed, engaging description covering what the painting depicts, artistic style and technique, size and material details, rooms or occasions it suits, care instructions, and shipping information.

3. TAGS (exactly {REQUIRED_TAGS} tags): relevant search terms such as art style, subject matter, room decor, color scheme, art type, and size.

RESPOND WITH ONLY THIS JSON OBJECT:
{{
    "title": "optimized title (max {MAX_TITLE_CHARS} chars)",
    "description": "detailed description",
    "tags": ["tag1", "tag2", "tag3", "tag4", "tag5", "tag6", "tag7", "tag8", "tag9", "tag10", "tag11", "tag12", "tag13"]
}}

Make the listing discoverable through Etsy search while accurately representing the artwork."#,
        title = info.painting_title,
        art_type = info.art_type,
        size = info.size,
        price = info.price,
    )
}

/// Parses a model reply strictly. No fence stripping or repair is attempted.
pub fn parse_listing_reply(reply: &str) -> Result<ListingContent, GenerationError> {
    let value: Value =
        serde_json::from_str(reply).map_err(|err| GenerationError::NotJson(err.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| GenerationError::NotJson("reply is not an object".into()))?;

    let field = |name: &'static str| object.get(name).ok_or(GenerationError::MissingField(name));
    let title = field("title")?
        .as_str()
        .ok_or(GenerationError::WrongType("title"))?;
    let description = field("description")?
        .as_str()
        .ok_or(GenerationError::WrongType("description"))?;
    let tags = field("tags")?
        .as_array()
        .ok_or(GenerationError::WrongType("tags"))?
        .iter()
        .map(|tag| tag.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or(GenerationError::WrongType("tags"))?;

    let title_chars = title.chars().count();
    if title_chars > MAX_TITLE_CHARS {
        return Err(GenerationError::TitleTooLong(title_chars));
    }
    if tags.len() != REQUIRED_TAGS {
        return Err(GenerationError::TagCount(tags.len()));
    }

    Ok(ListingContent {
        title: title.to_string(),
        description: description.to_string(),
        tags,
    })
}

/// Content type guessed from the file name, `image/jpeg` when the guess is
/// not an image type.
pub fn image_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string()
}

/// Produces listing copy for one downloaded image. A single model call,
/// validated strictly; any failure fails the whole step.
pub async fn generate_listing_content(
    model: &dyn VisionModel,
    image_path: &Path,
    folder_name: &str,
    settings: GenerationSettings,
) -> Result<(ListingContent, ProductInfo), GenerationError> {
    let info = ProductInfo::from_folder_name(folder_name);
    info!(
        target = "lister.content",
        folder_name,
        title = %info.painting_title,
        art_type = %info.art_type,
        "product_info_extracted"
    );

    let bytes = tokio::fs::read(image_path)
        .await
        .map_err(|err| GenerationError::ImageRead {
            path: image_path.display().to_string(),
            message: err.to_string(),
        })?;
    let request = VisionRequest {
        prompt: build_prompt(&info),
        image_base64: BASE64.encode(&bytes),
        image_mime: image_mime(image_path),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    let reply = model.complete(&request).await?;
    match parse_listing_reply(&reply) {
        Ok(content) => {
            info!(
                target = "lister.content",
                title_chars = content.title.chars().count(),
                tags = content.tags.len(),
                "listing_content_validated"
            );
            Ok((content, info))
        }
        Err(err) => {
            warn!(target = "lister.content", error = %err, "listing_content_rejected");
            Err(err)
        }
    }
}

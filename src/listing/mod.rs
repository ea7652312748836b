pub mod content;
pub mod product;

pub use content::{GenerationError, GenerationSettings, generate_listing_content, image_mime};
pub use product::{PriceError, ProductInfo};

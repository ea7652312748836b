use serde::Serialize;
use thiserror::Error;

const FALLBACK_ART_TYPE: &str = "Original";
const UNKNOWN: &str = "Unknown";

/// Product fields encoded in a folder name as `<Title>_<Type>_<Size>_<Price>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub painting_title: String,
    pub art_type: String,
    pub size: String,
    pub price: String,
}

impl ProductInfo {
    /// Names that do not split into exactly four `_` parts become the title,
    /// with the remaining fields defaulted.
    pub fn from_folder_name(folder_name: &str) -> Self {
        let parts: Vec<&str> = folder_name.split('_').collect();
        match parts.as_slice() {
            [title, art_type, size, price] => Self {
                painting_title: title.to_string(),
                art_type: art_type.to_string(),
                size: size.to_string(),
                price: price.to_string(),
            },
            _ => Self {
                painting_title: folder_name.to_string(),
                art_type: FALLBACK_ART_TYPE.to_string(),
                size: UNKNOWN.to_string(),
                price: UNKNOWN.to_string(),
            },
        }
    }

    pub fn price_cents(&self) -> Result<u64, PriceError> {
        price_to_cents(&self.price)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price {0:?} is not a decimal number")]
    NotANumber(String),
    #[error("price {0:?} must be positive")]
    NotPositive(String),
}

/// Converts a decimal price string to minor currency units, rounding to the
/// nearest cent.
pub fn price_to_cents(price: &str) -> Result<u64, PriceError> {
    let trimmed = price.trim().trim_start_matches('$');
    let value: f64 = trimmed
        .parse()
        .map_err(|_| PriceError::NotANumber(price.to_string()))?;
    if !value.is_finite() {
        return Err(PriceError::NotANumber(price.to_string()));
    }
    let cents = (value * 100.0).round();
    if cents <= 0.0 {
        return Err(PriceError::NotPositive(price.to_string()));
    }
    Ok(cents as u64)
}

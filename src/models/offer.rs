use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::OfferSource;
use crate::price;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub discount_percent: Option<u32>,
}

/// One product deal as collected from a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Offer {
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(custom(function = "validate_positive_price"))]
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[validate(url)]
    pub url: String,
    pub affiliate_url: Option<String>,
    pub image_url: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub store: String,
    pub source: OfferSource,
    pub product_id: Option<String>,
    pub coupon: Option<Coupon>,
    pub is_lowest_price: bool,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOffer {
    pub title: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub url: String,
    pub image_url: Option<String>,
    pub store: String,
    pub source: OfferSource,
    pub product_id: Option<String>,
    pub coupon: Option<Coupon>,
}

fn validate_not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_positive_price(price: &Decimal) -> std::result::Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("non_positive_price"));
    }
    Ok(())
}

impl Offer {
    pub fn new(new_offer: NewOffer) -> Self {
        // An "original" price that is not above the current one carries no information
        let original_price = new_offer.original_price.filter(|orig| *orig > new_offer.price);

        Self {
            title: collapse_whitespace(&new_offer.title),
            price: new_offer.price,
            original_price,
            url: new_offer.url.trim().to_string(),
            affiliate_url: None,
            image_url: new_offer.image_url.filter(|u| !u.trim().is_empty()),
            store: new_offer.store.trim().to_string(),
            source: new_offer.source,
            product_id: new_offer.product_id,
            coupon: new_offer.coupon,
            is_lowest_price: false,
            collected_at: Utc::now(),
        }
    }

    /// Runs the field rules and maps failures into the crate error.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }

    pub fn discount_percent(&self) -> Option<u32> {
        self.original_price
            .and_then(|orig| price::discount_percent(orig, self.price))
    }

    /// The link to publish: the affiliate one when conversion produced it.
    pub fn link(&self) -> &str {
        self.affiliate_url.as_deref().unwrap_or(&self.url)
    }

    pub fn offer_hash(&self) -> String {
        crate::dedup::offer_hash(&self.url, &self.title, &self.price.to_string(), &self.store)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::models::{generate_id, Offer, OfferSource};

/// A row of `posted_offers`: an offer that already went out to the channel.
///
/// Prices are stored as text so SQLite never rounds them through a float.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PostedOffer {
    pub id: String,
    pub product_id: Option<String>,
    pub store: String,
    pub title: String,
    pub price: String,
    pub original_price: Option<String>,
    pub url: String,
    pub affiliate_url: Option<String>,
    pub image_url: Option<String>,
    pub source: OfferSource,
    pub offer_hash: String,
    pub posted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostedOffer {
    pub fn from_offer(offer: &Offer) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            product_id: offer.product_id.clone(),
            store: offer.store.clone(),
            title: offer.title.clone(),
            price: offer.price.to_string(),
            original_price: offer.original_price.map(|p| p.to_string()),
            url: offer.url.clone(),
            affiliate_url: offer.affiliate_url.clone(),
            image_url: offer.image_url.clone(),
            source: offer.source,
            offer_hash: offer.offer_hash(),
            posted_at: now,
            updated_at: now,
        }
    }

    pub fn price_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(&self.price).ok()
    }

    pub fn original_price_decimal(&self) -> Option<Decimal> {
        self.original_price.as_deref().and_then(|p| Decimal::from_str(p).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOffer;

    #[test]
    fn test_from_offer_copies_identity() {
        let mut offer = Offer::new(NewOffer {
            title: "Headset HyperX Cloud Stinger".to_string(),
            price: Decimal::from_str("179.90").unwrap(),
            original_price: Some(Decimal::from_str("299.90").unwrap()),
            url: "https://www.amazon.com.br/dp/B01L2ZRYVE".to_string(),
            store: "Amazon".to_string(),
            source: OfferSource::Amazon,
            product_id: Some("B01L2ZRYVE".to_string()),
            ..Default::default()
        });
        offer.affiliate_url =
            Some("https://www.amazon.com.br/dp/B01L2ZRYVE?tag=garimpeirogee-20".to_string());

        let posted = PostedOffer::from_offer(&offer);
        assert_eq!(posted.id.len(), 32);
        assert_eq!(posted.offer_hash, offer.offer_hash());
        assert_eq!(posted.price, "179.90");
        assert_eq!(posted.price_decimal(), Some(offer.price));
        assert_eq!(posted.original_price_decimal(), offer.original_price);
        assert_eq!(posted.product_id.as_deref(), Some("B01L2ZRYVE"));
        assert_eq!(posted.posted_at, posted.updated_at);
    }
}

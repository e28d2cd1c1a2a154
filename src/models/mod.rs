use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod offer;
pub mod posted_offer;
pub mod setting;

pub use offer::*;
pub use posted_offer::*;
pub use setting::*;

/// Where an offer was collected.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum OfferSource {
    #[serde(rename = "promobit")]
    #[sqlx(rename = "promobit")]
    Promobit,
    #[serde(rename = "mercado_livre")]
    #[sqlx(rename = "mercado_livre")]
    MercadoLivre,
    #[serde(rename = "magalu")]
    #[sqlx(rename = "magalu")]
    Magalu,
    #[serde(rename = "amazon")]
    #[sqlx(rename = "amazon")]
    Amazon,
    #[serde(rename = "shopee")]
    #[sqlx(rename = "shopee")]
    Shopee,
    #[serde(rename = "fast_shop")]
    #[sqlx(rename = "fast_shop")]
    FastShop,
    #[serde(rename = "aliexpress")]
    #[sqlx(rename = "aliexpress")]
    AliExpress,
    #[default]
    #[serde(rename = "manual")]
    #[sqlx(rename = "manual")]
    Manual,
}

impl OfferSource {
    pub const ALL: [OfferSource; 8] = [
        OfferSource::Promobit,
        OfferSource::MercadoLivre,
        OfferSource::Magalu,
        OfferSource::Amazon,
        OfferSource::Shopee,
        OfferSource::FastShop,
        OfferSource::AliExpress,
        OfferSource::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferSource::Promobit => "promobit",
            OfferSource::MercadoLivre => "mercado_livre",
            OfferSource::Magalu => "magalu",
            OfferSource::Amazon => "amazon",
            OfferSource::Shopee => "shopee",
            OfferSource::FastShop => "fast_shop",
            OfferSource::AliExpress => "aliexpress",
            OfferSource::Manual => "manual",
        }
    }
}

impl fmt::Display for OfferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        OfferSource::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| format!("Unknown offer source: {}", s))
    }
}

// Helper function to generate ids in the format stored in the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

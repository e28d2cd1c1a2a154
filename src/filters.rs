use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::affiliate::stores;
use crate::config::FilterConfig;
use crate::models::{Offer, OfferSource};

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("missing fields: {0}")]
    MissingFields(String),
    #[error("price {price} outside the allowed range")]
    PriceOutOfRange { price: Decimal },
    #[error("discount {discount:?}% below the {minimum}% minimum")]
    DiscountTooLow { discount: Option<u32>, minimum: u32 },
    #[error("title contains blocked term '{0}'")]
    BlockedTerm(String),
    #[error("title matches none of the search keywords")]
    KeywordMismatch,
}

impl RejectReason {
    /// Short label used for metrics and run reports.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::MissingFields(_) => "missing_fields",
            RejectReason::PriceOutOfRange { .. } => "price_out_of_range",
            RejectReason::DiscountTooLow { .. } => "discount_too_low",
            RejectReason::BlockedTerm(_) => "blocked_term",
            RejectReason::KeywordMismatch => "keyword_mismatch",
        }
    }
}

const DISCOUNT_WEIGHT: f64 = 0.55;
const PLATFORM_WEIGHT: f64 = 0.30;
const KEYWORD_WEIGHT: f64 = 0.15;
/// Discount at which the discount component saturates.
const FULL_DISCOUNT: f64 = 60.0;
const UNKNOWN_DISCOUNT: f64 = 0.25;

/// Relative trust in each platform's deals.
pub fn platform_weight(platform: &str) -> f64 {
    match platform {
        "amazon" => 1.0,
        "shopee" => 0.8,
        "mercadolivre" | "mercado_livre" => 0.7,
        "aliexpress" => 0.6,
        _ => 0.75,
    }
}

/// Platform of the store actually selling, falling back to the source tag.
fn platform_of(offer: &Offer) -> String {
    match stores::detect_store(&offer.url) {
        Some(store) if store.slug != "promobit" => store.slug.to_string(),
        _ if offer.source != OfferSource::Promobit => offer.source.as_str().to_string(),
        _ => "other".to_string(),
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct OfferFilter {
    config: FilterConfig,
}

impl OfferFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, offer: &Offer) -> Result<(), RejectReason> {
        let mut missing = Vec::new();
        if offer.title.trim().is_empty() {
            missing.push("title");
        }
        if offer.url.trim().is_empty() {
            missing.push("url");
        }
        if offer.store.trim().is_empty() {
            missing.push("store");
        }
        if offer.price <= Decimal::ZERO {
            missing.push("price");
        }
        if !missing.is_empty() {
            return Err(RejectReason::MissingFields(missing.join(", ")));
        }

        let too_expensive = self.config.max_price.is_some_and(|max| offer.price > max);
        if offer.price < self.config.min_price || too_expensive {
            return Err(RejectReason::PriceOutOfRange { price: offer.price });
        }

        let minimum = self.config.min_discount_percent;
        match offer.discount_percent() {
            Some(discount) if discount < minimum => {
                return Err(RejectReason::DiscountTooLow { discount: Some(discount), minimum });
            }
            None if self.config.require_discount => {
                return Err(RejectReason::DiscountTooLow { discount: None, minimum });
            }
            _ => {}
        }

        let title = offer.title.to_lowercase();
        if let Some(term) = self
            .config
            .blocked_terms
            .iter()
            .find(|term| title.contains(&term.to_lowercase()))
        {
            return Err(RejectReason::BlockedTerm(term.clone()));
        }

        if self.config.require_keyword
            && !self.config.keywords.is_empty()
            && !self.config.keywords.iter().any(|k| title.contains(&k.to_lowercase()))
        {
            return Err(RejectReason::KeywordMismatch);
        }

        Ok(())
    }

    /// Quality score in `[0, 1]`.
    pub fn score(&self, offer: &Offer) -> f64 {
        let discount = offer
            .discount_percent()
            .map(|d| (f64::from(d) / FULL_DISCOUNT).min(1.0))
            .unwrap_or(UNKNOWN_DISCOUNT);

        let title_words = words(&offer.title);
        let hits = |list: &[String]| {
            list.iter()
                .filter(|k| title_words.iter().any(|w| *w == k.to_lowercase()))
                .count() as f64
        };
        let keywords =
            (0.5 + 0.25 * hits(&self.config.boost_keywords) - 0.25 * hits(&self.config.reduce_keywords)).clamp(0.0, 1.0);

        let platform = platform_weight(&platform_of(offer));

        (DISCOUNT_WEIGHT * discount + PLATFORM_WEIGHT * platform + KEYWORD_WEIGHT * keywords).clamp(0.0, 1.0)
    }

    /// Score of an accepted offer, or why it was rejected.
    pub fn evaluate(&self, offer: &Offer) -> Result<f64, RejectReason> {
        self.check(offer)?;
        Ok(self.score(offer))
    }
}

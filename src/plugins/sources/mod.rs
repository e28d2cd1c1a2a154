// Offer source implementations
pub mod aliexpress;
pub mod amazon;
pub mod fast_shop;
pub mod magalu;
pub mod mercado_livre;
pub mod promobit;
pub mod shopee;

pub use aliexpress::AliExpressSource;
pub use amazon::AmazonSource;
pub use fast_shop::FastShopSource;
pub use magalu::MagaluSource;
pub use mercado_livre::MercadoLivreSource;
pub use promobit::PromobitSource;
pub use shopee::ShopeeSource;

use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::models::{NewOffer, Offer, OfferSource};
use crate::scraper::WebScraper;
use crate::utils::error::{AppError, Result};

/// Fields scraped from one product card, before validation.
#[derive(Debug, Default, Clone)]
pub struct CardFields {
    pub title: Option<String>,
    pub url: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub product_id: Option<String>,
}

impl CardFields {
    /// `None` unless title, link and a positive price were all found.
    pub fn into_offer(self, store: &str, source: OfferSource) -> Option<Offer> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let url = self.url?;
        let price = self.price.filter(|p| *p > Decimal::ZERO)?;
        Some(Offer::new(NewOffer {
            title,
            price,
            original_price: self.original_price,
            url,
            image_url: self.image_url.filter(|u| u.starts_with("http")),
            store: store.to_string(),
            source,
            product_id: self.product_id,
            coupon: None,
        }))
    }
}

/// Fetch one search page per keyword until `limit` offers are collected.
///
/// Fails only when every page failed to load.
pub(crate) async fn collect_keyword_pages<B, P>(
    scraper: &WebScraper,
    source: OfferSource,
    keywords: &[String],
    limit: usize,
    build_url: B,
    parse: P,
) -> Result<Vec<Offer>>
where
    B: Fn(&str) -> String,
    P: Fn(&str) -> Vec<Offer>,
{
    let mut offers = Vec::new();
    let mut seen = HashSet::new();
    let mut failures = 0usize;
    let mut last_error = None;

    for keyword in keywords {
        if offers.len() >= limit {
            break;
        }
        let url = build_url(keyword);
        let result = scraper.fetch_html(&url).await;
        let html = match result.into_html() {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(source = %source, keyword = %keyword, error = %e, "Search page failed");
                failures += 1;
                last_error = Some(e);
                continue;
            }
        };

        let parsed = parse(&html);
        tracing::debug!(source = %source, keyword = %keyword, count = parsed.len(), "Parsed search page");
        for offer in parsed {
            if offers.len() >= limit {
                break;
            }
            if seen.insert(offer.url.clone()) {
                offers.push(offer);
            }
        }
    }

    if !keywords.is_empty() && failures == keywords.len() {
        return Err(last_error.unwrap_or_else(|| AppError::Scraping(format!("{} returned nothing", source))));
    }
    Ok(offers)
}

/// Search terms as they appear in a URL path, e.g. `placa de vídeo` -> `placa-de-vídeo`.
pub(crate) fn slugify_query(query: &str, separator: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(separator)
}

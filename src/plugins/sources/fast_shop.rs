use async_trait::async_trait;
use scraper::Html;

use super::CardFields;
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::{extract_card_prices, parse_brl};
use crate::scraper::{absolutize, element_text, select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const FAST_SHOP_URL: &str = "https://www.fastshop.com.br/ofertas";

pub struct FastShopSource {
    scraper: WebScraper,
    url: String,
}

impl FastShopSource {
    pub fn new(scraper: WebScraper) -> Self {
        Self::with_base_url(scraper, FAST_SHOP_URL)
    }

    pub fn with_base_url(scraper: WebScraper, url: impl Into<String>) -> Self {
        Self { scraper, url: url.into() }
    }
}

/// Product links carry the SKU as a `<code>_PRD` path segment.
fn sku(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let sku = parsed
        .path_segments()?
        .find_map(|segment| segment.strip_suffix("_PRD"))?
        .to_string();
    (!sku.is_empty()).then_some(sku)
}

pub fn parse_offers(html: &str, base_url: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("[class*='ProductCard'], article");

    document
        .select(&cards)
        // nested ProductCard__* elements belong to the outer card
        .filter(|card| {
            card.ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .all(|parent| !parent.value().classes().any(|c| c.contains("ProductCard")))
        })
        .filter_map(|card| {
            let href = select_attr(&card, &["a[href]"], "href")?;
            let url = absolutize(base_url, &href)?;

            // Labelled price elements first, then any R$ amounts on the card
            let labelled = select_text(&card, &["[class*='salePrice']", "[class*='sale-price']", "[class*='SalePrice']"])
                .and_then(|t| parse_brl(&t));
            let prices = extract_card_prices(&element_text(&card));
            let original_price = select_text(&card, &["[class*='oldPrice']", "[class*='old-price']", "[class*='listPrice']", "del", "s"])
                .and_then(|t| parse_brl(&t))
                .or(prices.original);

            CardFields {
                title: select_text(&card, &["[class*='title']", "[class*='Title']", "[class*='name']", "h2", "h3"]),
                product_id: sku(&url),
                url: Some(url),
                price: labelled.or(prices.current),
                original_price,
                image_url: select_attr(&card, &["img"], "src"),
            }
            .into_offer("Fast Shop", OfferSource::FastShop)
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for FastShopSource {
    fn name(&self) -> &'static str {
        "Fast Shop"
    }

    fn source(&self) -> OfferSource {
        OfferSource::FastShop
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let html = self.scraper.fetch_html(&self.url).await.into_html()?;
        let mut offers = parse_offers(&html, &self.url);
        offers.truncate(limit);
        tracing::info!(source = "fast_shop", count = offers.len(), "Collected offers");
        Ok(offers)
    }
}

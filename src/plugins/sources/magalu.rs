use async_trait::async_trait;
use scraper::Html;

use super::{collect_keyword_pages, slugify_query, CardFields};
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::parse_brl;
use crate::scraper::{absolutize, select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const MAGALU_URL: &str = "https://www.magazineluiza.com.br";

pub struct MagaluSource {
    scraper: WebScraper,
    keywords: Vec<String>,
    base_url: String,
}

impl MagaluSource {
    pub fn new(scraper: WebScraper, keywords: Vec<String>) -> Self {
        Self::with_base_url(scraper, keywords, MAGALU_URL)
    }

    pub fn with_base_url(scraper: WebScraper, keywords: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            scraper,
            keywords,
            base_url: base_url.into(),
        }
    }
}

/// Product id from `/p/<id>/` in a Magalu URL.
pub fn product_id(url: &str) -> Option<String> {
    let mut segments = url.split('/');
    segments.by_ref().find(|s| *s == "p")?;
    segments
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
}

pub fn parse_search(html: &str, base_url: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("li[data-testid='product-card'], div[data-testid='product-card']");

    document
        .select(&cards)
        .filter_map(|card| {
            let href = select_attr(&card, &["a[data-testid='product-card-container']", "a[href]"], "href")?;
            let url = absolutize(base_url, &href)?;

            CardFields {
                title: select_text(&card, &["[data-testid='product-title']", "h2", "h3"]),
                product_id: product_id(&url),
                url: Some(url),
                price: select_text(&card, &["[data-testid='price-value']"]).and_then(|t| parse_brl(&t)),
                original_price: select_text(&card, &["[data-testid='price-original']"]).and_then(|t| parse_brl(&t)),
                image_url: select_attr(&card, &["img"], "src"),
            }
            .into_offer("Magazine Luiza", OfferSource::Magalu)
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for MagaluSource {
    fn name(&self) -> &'static str {
        "Magazine Luiza"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Magalu
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let base = self.base_url.trim_end_matches('/');
        collect_keyword_pages(
            &self.scraper,
            OfferSource::Magalu,
            &self.keywords,
            limit,
            |keyword| format!("{}/busca/{}/", base, slugify_query(keyword, "+")),
            |html| parse_search(html, base),
        )
        .await
    }
}

use async_trait::async_trait;
use scraper::Html;

use super::{collect_keyword_pages, slugify_query, CardFields};
use crate::affiliate::asin::is_asin;
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::parse_brl;
use crate::scraper::{select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const AMAZON_URL: &str = "https://www.amazon.com.br";

pub struct AmazonSource {
    scraper: WebScraper,
    keywords: Vec<String>,
    base_url: String,
}

impl AmazonSource {
    pub fn new(scraper: WebScraper, keywords: Vec<String>) -> Self {
        Self::with_base_url(scraper, keywords, AMAZON_URL)
    }

    pub fn with_base_url(scraper: WebScraper, keywords: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            scraper,
            keywords,
            base_url: base_url.into(),
        }
    }
}

/// Search result grid. Product links are rebuilt as `/dp/<ASIN>`.
pub fn parse_search(html: &str, base_url: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("div[data-asin][data-component-type='s-search-result'], div.s-result-item[data-asin]");
    let base = base_url.trim_end_matches('/');

    document
        .select(&cards)
        .filter_map(|card| {
            let asin = card.value().attr("data-asin").map(str::to_uppercase).filter(|a| is_asin(a))?;

            CardFields {
                title: select_text(&card, &["h2 span", "h2"]),
                url: Some(format!("{}/dp/{}", base, asin)),
                price: select_text(&card, &["span.a-price:not(.a-text-price) span.a-offscreen"])
                    .and_then(|t| parse_brl(&t)),
                original_price: select_text(&card, &["span.a-price.a-text-price span.a-offscreen"])
                    .and_then(|t| parse_brl(&t)),
                image_url: select_attr(&card, &["img.s-image"], "src"),
                product_id: Some(asin),
            }
            .into_offer("Amazon", OfferSource::Amazon)
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for AmazonSource {
    fn name(&self) -> &'static str {
        "Amazon"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Amazon
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let base = self.base_url.trim_end_matches('/');
        collect_keyword_pages(
            &self.scraper,
            OfferSource::Amazon,
            &self.keywords,
            limit,
            |keyword| format!("{}/s?k={}", base, slugify_query(keyword, "+")),
            |html| parse_search(html, base),
        )
        .await
    }
}

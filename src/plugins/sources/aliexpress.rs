use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::{collect_keyword_pages, slugify_query, CardFields};
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::extract_card_prices;
use crate::scraper::{absolutize, element_text, select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const ALIEXPRESS_URL: &str = "https://pt.aliexpress.com";

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(?:item|i)/(\d{6,})\.html").expect("valid item regex"))
}

/// Numeric product id from `/item/<id>.html` or `/i/<id>.html`.
pub fn product_id(url: &str) -> Option<String> {
    item_regex().captures(url).map(|c| c[1].to_string())
}

pub struct AliExpressSource {
    scraper: WebScraper,
    keywords: Vec<String>,
    base_url: String,
}

impl AliExpressSource {
    pub fn new(scraper: WebScraper, keywords: Vec<String>) -> Self {
        Self::with_base_url(scraper, keywords, ALIEXPRESS_URL)
    }

    pub fn with_base_url(scraper: WebScraper, keywords: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            scraper,
            keywords,
            base_url: base_url.into(),
        }
    }
}

/// Search results. Each product is an anchor to its item page; links are
/// rebuilt without the tracking query.
pub fn parse_search(html: &str, base_url: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("a[href*='/item/'], a[href*='/i/']");
    let base = base_url.trim_end_matches('/');
    let mut seen = HashSet::new();

    document
        .select(&cards)
        .filter_map(|card| {
            let href = card.value().attr("href")?;
            let id = product_id(href)?;
            if !seen.insert(id.clone()) {
                return None;
            }
            let prices = extract_card_prices(&element_text(&card));
            let image_url = select_attr(&card, &["img"], "src").and_then(|src| absolutize(base, &src));

            CardFields {
                title: select_text(&card, &["h3", "h1", "[class*='title']"]),
                url: Some(format!("{}/item/{}.html", base, id)),
                price: prices.current,
                original_price: prices.original,
                image_url,
                product_id: Some(id),
            }
            .into_offer("AliExpress", OfferSource::AliExpress)
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for AliExpressSource {
    fn name(&self) -> &'static str {
        "AliExpress"
    }

    fn source(&self) -> OfferSource {
        OfferSource::AliExpress
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let base = self.base_url.trim_end_matches('/');
        collect_keyword_pages(
            &self.scraper,
            OfferSource::AliExpress,
            &self.keywords,
            limit,
            |keyword| format!("{}/w/wholesale-{}.html", base, slugify_query(keyword, "-")),
            |html| parse_search(html, base),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const FIXTURE: &str = r#"
        <div id="card-list">
          <a class="search-card-item" href="//pt.aliexpress.com/item/1005006140641224.html?algo_pvid=abc">
            <img src="//ae-pic-a1.aliexpress-media.com/kb/teclado.jpg">
            <h3>Teclado Mecânico Aula F75 Gasket</h3>
            <div class="price-sale">R$ 189,90</div>
            <div class="price-original">R$ 379,80</div>
            <span>-50%</span>
          </a>
          <a href="https://pt.aliexpress.com/item/1005006140641224.html">duplicado</a>
          <a href="https://pt.aliexpress.com/category/teclados.html"><h3>Categoria</h3></a>
        </div>
    "#;

    #[test]
    fn test_parse_search() {
        let offers = parse_search(FIXTURE, ALIEXPRESS_URL);
        assert_eq!(offers.len(), 1);
        let keyboard = &offers[0];
        assert_eq!(keyboard.title, "Teclado Mecânico Aula F75 Gasket");
        assert_eq!(keyboard.url, "https://pt.aliexpress.com/item/1005006140641224.html");
        assert_eq!(keyboard.price, Decimal::from_str("189.90").unwrap());
        assert_eq!(keyboard.original_price, Some(Decimal::from_str("379.80").unwrap()));
        assert_eq!(
            keyboard.image_url.as_deref(),
            Some("https://ae-pic-a1.aliexpress-media.com/kb/teclado.jpg")
        );
    }

    #[test]
    fn test_product_id() {
        assert_eq!(
            product_id("https://pt.aliexpress.com/i/1005001234567890.html"),
            Some("1005001234567890".to_string())
        );
        assert_eq!(product_id("https://pt.aliexpress.com/store/123"), None);
    }
}

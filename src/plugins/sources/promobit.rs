use async_trait::async_trait;
use scraper::Html;

use super::CardFields;
use crate::affiliate::outbound_link;
use crate::affiliate::stores::{self, UNKNOWN_STORE};
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::extract_card_prices;
use crate::scraper::{absolutize, element_text, select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const PROMOBIT_URL: &str = "https://www.promobit.com.br/";

/// Deal aggregator front page. Cards link out to many different stores.
pub struct PromobitSource {
    scraper: WebScraper,
    base_url: String,
}

impl PromobitSource {
    pub fn new(scraper: WebScraper) -> Self {
        Self::with_base_url(scraper, PROMOBIT_URL)
    }

    pub fn with_base_url(scraper: WebScraper, base_url: impl Into<String>) -> Self {
        Self {
            scraper,
            base_url: base_url.into(),
        }
    }
}

/// Store of the outbound link, or the one named on the card when the link stays on Promobit.
fn card_store(link: &str, card_store_text: Option<String>) -> String {
    match stores::detect_store(&outbound_link(link)) {
        Some(store) if store.slug != "promobit" => store.name.to_string(),
        _ => card_store_text
            .and_then(|text| stores::STORES.iter().find(|s| text.to_lowercase().contains(&s.name.to_lowercase())))
            .map(|s| s.name.to_string())
            .unwrap_or_else(|| UNKNOWN_STORE.to_string()),
    }
}

pub fn parse_page(html: &str, base_url: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("article, section[data-testid='offer-card'], div[data-testid='offer-card']");

    document
        .select(&cards)
        .filter_map(|card| {
            let href = select_attr(&card, &["a[href*='/redirect']", "a[href]"], "href")?;
            let url = absolutize(base_url, &href)?;
            let title = select_text(&card, &["span.line-clamp-2", "h2", "h3", "h4"]);
            let text = element_text(&card);
            let prices = extract_card_prices(&text);
            let image_url = select_attr(&card, &["img"], "src")
                .or_else(|| select_attr(&card, &["img"], "data-src"));
            let store_text = select_text(&card, &["[data-testid='store-name']", "[class*='store']", "[class*='Store']"]);
            let store = card_store(&url, store_text);

            CardFields {
                title,
                url: Some(url),
                price: prices.current,
                original_price: prices.original,
                image_url,
                product_id: None,
            }
            .into_offer(&store, OfferSource::Promobit)
            .map(|mut offer| {
                offer.is_lowest_price = text.to_lowercase().contains("menor preço");
                offer
            })
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for PromobitSource {
    fn name(&self) -> &'static str {
        "Promobit"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Promobit
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let html = self.scraper.fetch_html(&self.base_url).await.into_html()?;
        let mut offers = parse_page(&html, &self.base_url);
        offers.truncate(limit);
        tracing::info!(source = "promobit", count = offers.len(), "Collected offers");
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const FIXTURE: &str = r#"
        <html><body>
          <article>
            <a href="/redirect?url=https%3A%2F%2Fwww.kabum.com.br%2Fproduto%2F1">
              <img src="https://i.promobit.com.br/ssd.jpg">
              <span class="line-clamp-2">SSD Kingston NV2 1TB</span>
            </a>
            <span class="store-name">KaBuM!</span>
            <span>R$ 499,90</span><span>R$ 379,90</span><span>24% OFF</span>
          </article>
          <article>
            <a href="https://www.amazon.com.br/dp/B0CP31L73X"><h3>Kindle 11ª geração</h3></a>
            <span>R$ 549,00</span>
            <span class="badge">Menor preço</span>
          </article>
          <article><h3>Cupom sem preço</h3><a href="/cupom/1">ver</a></article>
        </body></html>
    "#;

    #[test]
    fn test_parse_page() {
        let offers = parse_page(FIXTURE, PROMOBIT_URL);
        assert_eq!(offers.len(), 2);

        let ssd = &offers[0];
        assert_eq!(ssd.title, "SSD Kingston NV2 1TB");
        assert_eq!(ssd.store, "KaBuM!");
        assert_eq!(ssd.price, Decimal::from_str("379.90").unwrap());
        assert_eq!(ssd.original_price, Some(Decimal::from_str("499.90").unwrap()));
        assert!(ssd.url.starts_with("https://www.promobit.com.br/redirect?url="));
        assert_eq!(ssd.image_url.as_deref(), Some("https://i.promobit.com.br/ssd.jpg"));

        let kindle = &offers[1];
        assert_eq!(kindle.store, "Amazon");
        assert_eq!(kindle.original_price, None);
        assert_eq!(kindle.source, OfferSource::Promobit);
        assert!(kindle.is_lowest_price);
        assert!(!ssd.is_lowest_price);
    }

    #[test]
    fn test_card_store_follows_redirect_wrapper() {
        let wrapped = "https://www.promobit.com.br/redirect?url=https%3A%2F%2Fwww.kabum.com.br%2Fproduto%2F1";
        assert_eq!(card_store(wrapped, None), "KaBuM!");
        // the outbound link wins over whatever the card text says
        assert_eq!(card_store(wrapped, Some("Vendido por Pichau".to_string())), "KaBuM!");
    }

    #[test]
    fn test_card_store_fallback() {
        assert_eq!(card_store("https://www.promobit.com.br/oferta/1", None), UNKNOWN_STORE);
        assert_eq!(
            card_store("https://www.promobit.com.br/oferta/1", Some("Vendido por Pichau".to_string())),
            "Pichau"
        );
    }
}

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

use super::{collect_keyword_pages, slugify_query, CardFields};
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::price::parse_brl;
use crate::scraper::{select_attr, select_text, selector, WebScraper};
use crate::utils::error::Result;

pub const SEARCH_URL: &str = "https://lista.mercadolivre.com.br";

fn item_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(MLB)-?(\d{6,})").expect("valid item id regex"))
}

pub fn item_id(url: &str) -> Option<String> {
    item_id_regex()
        .captures(url)
        .map(|c| format!("{}{}", &c[1], &c[2]))
}

/// Price of an `andes-money-amount` block: fraction plus optional cents.
fn money_amount(amount: &ElementRef<'_>) -> Option<Decimal> {
    let fraction = select_text(amount, &["span.andes-money-amount__fraction"])?;
    let text = match select_text(amount, &["span.andes-money-amount__cents"]) {
        Some(cents) => format!("{},{}", fraction, cents),
        None => fraction,
    };
    parse_brl(&text)
}

pub struct MercadoLivreSource {
    scraper: WebScraper,
    keywords: Vec<String>,
    base_url: String,
}

impl MercadoLivreSource {
    pub fn new(scraper: WebScraper, keywords: Vec<String>) -> Self {
        Self::with_base_url(scraper, keywords, SEARCH_URL)
    }

    pub fn with_base_url(scraper: WebScraper, keywords: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            scraper,
            keywords,
            base_url: base_url.into(),
        }
    }
}

pub fn parse_search(html: &str) -> Vec<Offer> {
    let document = Html::parse_document(html);
    let cards = selector("li.ui-search-layout__item, div.ui-search-result__wrapper");
    let current_sel = selector("span.andes-money-amount:not(.andes-money-amount--previous)");
    let previous_sel = selector(".andes-money-amount--previous");

    document
        .select(&cards)
        .filter_map(|card| {
            let url = select_attr(&card, &["a.poly-component__title", "a.ui-search-link", "a[href]"], "href")?;
            let price = card.select(&current_sel).find_map(|el| money_amount(&el));
            let original_price = card.select(&previous_sel).find_map(|el| money_amount(&el));

            CardFields {
                title: select_text(&card, &["h2", "a.poly-component__title", "h3"]),
                product_id: item_id(&url),
                url: Some(url),
                price,
                original_price,
                image_url: select_attr(&card, &["img"], "data-src").or_else(|| select_attr(&card, &["img"], "src")),
            }
            .into_offer("Mercado Livre", OfferSource::MercadoLivre)
        })
        .collect()
}

#[async_trait]
impl SourcePlugin for MercadoLivreSource {
    fn name(&self) -> &'static str {
        "Mercado Livre"
    }

    fn source(&self) -> OfferSource {
        OfferSource::MercadoLivre
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let base = self.base_url.trim_end_matches('/');
        collect_keyword_pages(
            &self.scraper,
            OfferSource::MercadoLivre,
            &self.keywords,
            limit,
            |keyword| format!("{}/{}", base, slugify_query(keyword, "-")),
            parse_search,
        )
        .await
    }
}

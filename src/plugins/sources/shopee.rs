use async_trait::async_trait;
use std::collections::HashSet;

use crate::affiliate::shopee::ShopeeAffiliateClient;
use crate::models::{Offer, OfferSource};
use crate::plugins::traits::SourcePlugin;
use crate::utils::error::{AppError, Result};

/// Offers from the Shopee affiliate API. Links arrive already affiliated.
pub struct ShopeeSource {
    client: ShopeeAffiliateClient,
    keywords: Vec<String>,
}

impl ShopeeSource {
    pub fn new(client: ShopeeAffiliateClient, keywords: Vec<String>) -> Self {
        Self { client, keywords }
    }
}

#[async_trait]
impl SourcePlugin for ShopeeSource {
    fn name(&self) -> &'static str {
        "Shopee"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Shopee
    }

    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>> {
        let mut offers = Vec::new();
        let mut seen = HashSet::new();
        let mut last_error = None;
        let mut failures = 0usize;

        for keyword in &self.keywords {
            if offers.len() >= limit {
                break;
            }
            let products = match self.client.product_offers(keyword, limit - offers.len()).await {
                Ok(products) => products,
                Err(e) => {
                    tracing::warn!(source = "shopee", keyword = %keyword, error = %e, "productOfferV2 failed");
                    failures += 1;
                    last_error = Some(e);
                    continue;
                }
            };
            for offer in products.into_iter().filter_map(|p| p.into_offer()) {
                if offers.len() >= limit {
                    break;
                }
                if seen.insert(offer.url.clone()) {
                    offers.push(offer);
                }
            }
        }

        if !self.keywords.is_empty() && failures == self.keywords.len() {
            return Err(last_error.unwrap_or_else(|| AppError::Scraping("shopee returned nothing".to_string())));
        }
        tracing::info!(source = "shopee", count = offers.len(), "Collected offers");
        Ok(offers)
    }
}

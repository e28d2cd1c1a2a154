use async_trait::async_trait;

use crate::models::{Offer, OfferSource};
use crate::utils::error::Result;

/// A place deals are collected from (a retailer page, an aggregator, an API).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &'static str;
    fn source(&self) -> OfferSource;

    /// Up to `limit` offers. Errors mean "nothing from this source this run".
    async fn fetch_offers(&self, limit: usize) -> Result<Vec<Offer>>;
}

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::notifiers::TelegramNotifier;
use super::sources::{
    AliExpressSource, AmazonSource, FastShopSource, MagaluSource, MercadoLivreSource, PromobitSource, ShopeeSource,
};
use super::traits::{NotificationResult, NotifierPlugin, SourcePlugin};
use crate::affiliate::ShopeeAffiliateClient;
use crate::config::AppConfig;
use crate::models::Offer;
use crate::scraper::WebScraper;
use crate::utils::error::{AppError, Result};

pub type SourcePluginRef = Arc<dyn SourcePlugin>;
pub type NotifierPluginRef = Arc<dyn NotifierPlugin>;

/// Registry of offer sources and notifiers keyed by type name.
#[derive(Clone)]
pub struct PluginManager {
    sources: Arc<RwLock<HashMap<String, SourcePluginRef>>>,
    notifiers: Arc<RwLock<HashMap<String, NotifierPluginRef>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
            notifiers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the registry from config: every enabled source plus Telegram
    /// when a bot token is present.
    pub async fn from_config(config: &AppConfig, scraper: WebScraper) -> Result<Self> {
        let manager = Self::new();
        let keywords = config.filters.keywords.clone();
        let shopee = ShopeeAffiliateClient::from_config(&config.affiliate.shopee, config.scraper.request_timeout)?;

        for name in &config.scraper.enabled_sources {
            let source: SourcePluginRef = match name.as_str() {
                "promobit" => Arc::new(PromobitSource::new(scraper.clone())),
                "mercado_livre" => Arc::new(MercadoLivreSource::new(scraper.clone(), keywords.clone())),
                "magalu" => Arc::new(MagaluSource::new(scraper.clone(), keywords.clone())),
                "amazon" => Arc::new(AmazonSource::new(scraper.clone(), keywords.clone())),
                "fast_shop" => Arc::new(FastShopSource::new(scraper.clone())),
                "aliexpress" => Arc::new(AliExpressSource::new(scraper.clone(), keywords.clone())),
                "shopee" => match shopee.clone() {
                    Some(client) => Arc::new(ShopeeSource::new(client, keywords.clone())),
                    None => {
                        tracing::warn!("Shopee source enabled without affiliate credentials, skipping");
                        continue;
                    }
                },
                other => {
                    tracing::warn!(source = other, "Unknown source in scraper.enabled_sources");
                    continue;
                }
            };
            manager.register_source(source).await;
        }

        if config.telegram.bot_token.is_empty() {
            tracing::warn!("Telegram bot token not set, offers will not be posted");
        } else {
            manager
                .register_notifier(Arc::new(TelegramNotifier::new(config.telegram.clone())?))
                .await;
        }

        Ok(manager)
    }

    pub async fn register_source(&self, plugin: SourcePluginRef) {
        let key = plugin.source().to_string();
        tracing::debug!(source = %key, "Registered source");
        self.sources.write().await.insert(key, plugin);
    }

    pub async fn register_notifier(&self, plugin: NotifierPluginRef) {
        let key = plugin.plugin_type().to_string();
        tracing::debug!(notifier = %key, "Registered notifier");
        self.notifiers.write().await.insert(key, plugin);
    }

    pub async fn has_source(&self, source_type: &str) -> bool {
        self.sources.read().await.contains_key(source_type)
    }

    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        self.notifiers.read().await.contains_key(plugin_type)
    }

    /// Registered source tags, sorted.
    pub async fn list_source_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.sources.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn list_notifier_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.notifiers.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn source(&self, source_type: &str) -> Result<SourcePluginRef> {
        self.sources
            .read()
            .await
            .get(source_type)
            .cloned()
            .ok_or_else(|| AppError::plugin(source_type, "source not registered"))
    }

    /// Snapshot of every source, sorted by tag.
    pub async fn sources(&self) -> Vec<SourcePluginRef> {
        let sources = self.sources.read().await;
        let mut all: Vec<SourcePluginRef> = sources.values().cloned().collect();
        all.sort_by_key(|s| s.source().to_string());
        all
    }

    pub async fn notifier(&self, plugin_type: &str) -> Result<NotifierPluginRef> {
        self.notifiers
            .read()
            .await
            .get(plugin_type)
            .cloned()
            .ok_or_else(|| AppError::plugin(plugin_type, "notifier not registered"))
    }

    pub async fn notifiers(&self) -> Vec<NotifierPluginRef> {
        self.notifiers.read().await.values().cloned().collect()
    }

    /// Send an offer through one notifier.
    pub async fn send_notification(&self, plugin_type: &str, offer: &Offer) -> Result<NotificationResult> {
        let notifier = self.notifier(plugin_type).await?;
        notifier
            .notify(offer)
            .await
            .map_err(|e| AppError::plugin(plugin_type, e.to_string()))
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

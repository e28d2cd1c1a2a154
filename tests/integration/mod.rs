// Integration tests for Garimpeiro Geek
// These tests drive the public API against in-memory SQLite and mock HTTP servers

pub mod api_tests;
pub mod converter_tests;
pub mod pipeline_tests;
pub mod shopee_tests;
pub mod storage_tests;
pub mod telegram_tests;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use garimpeiro_geek::{
    models::{NewOffer, Offer, OfferSource},
    plugins::{NotificationResult, NotifierPlugin, PluginManager, SourcePlugin},
    storage::{self, OfferRepository},
    web::AppState,
    AffiliateConverter, AppConfig, DealPipeline, DealScheduler,
};

/// Default configuration with test-friendly overrides.
pub fn get_test_config() -> AppConfig {
    let mut config = AppConfig::from_toml_str(include_str!("../../config/default.toml"))
        .expect("default config must parse");
    config.database.url = "sqlite::memory:".to_string();
    config.scheduler.post_delay_ms = 0;
    config.scraper.retry_attempts = 1;
    config.scraper.retry_delay_ms = 10;
    config.scraper.min_domain_interval_ms = 0;
    config
}

/// Single-connection in-memory database so every query sees the same data.
pub async fn create_test_db() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    storage::migrate(&pool).await?;
    Ok(pool)
}

pub async fn create_test_pipeline(config: &AppConfig, plugins: PluginManager) -> anyhow::Result<Arc<DealPipeline>> {
    let pool = create_test_db().await?;
    Ok(Arc::new(DealPipeline::new(
        config,
        plugins,
        AffiliateConverter::new(&config.affiliate),
        OfferRepository::new(pool),
    )))
}

pub async fn create_test_app_state(plugins: PluginManager) -> anyhow::Result<AppState> {
    let config = get_test_config();
    let pipeline = create_test_pipeline(&config, plugins).await?;
    let scheduler = DealScheduler::new(Arc::clone(&pipeline), config.scheduler.clone()).await?;
    Ok(AppState::new(pipeline, Arc::new(scheduler), config))
}

/// Send one request through the router and decode the JSON body.
pub async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body)?).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

pub fn sample_offer(title: &str, price: &str, original: Option<&str>, url: &str, store: &str) -> Offer {
    Offer::new(NewOffer {
        title: title.to_string(),
        price: Decimal::from_str(price).expect("valid price"),
        original_price: original.map(|o| Decimal::from_str(o).expect("valid price")),
        url: url.to_string(),
        store: store.to_string(),
        source: OfferSource::Promobit,
        ..Default::default()
    })
}

/// Source that hands out a fixed list of offers.
pub struct StaticSource {
    pub offers: Vec<Offer>,
}

#[async_trait]
impl SourcePlugin for StaticSource {
    fn name(&self) -> &'static str {
        "Static"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Promobit
    }

    async fn fetch_offers(&self, limit: usize) -> garimpeiro_geek::Result<Vec<Offer>> {
        Ok(self.offers.iter().take(limit).cloned().collect())
    }
}

/// Notifier that remembers every title it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn plugin_type(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, offer: &Offer) -> garimpeiro_geek::Result<NotificationResult> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(offer.title.clone());
        }
        Ok(NotificationResult::sent(None))
    }

    async fn send_text(&self, text: &str) -> garimpeiro_geek::Result<NotificationResult> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        Ok(NotificationResult::sent(None))
    }

    async fn test_connection(&self) -> garimpeiro_geek::Result<bool> {
        Ok(true)
    }
}

/// Plugin manager with one static source and a recording notifier.
pub async fn plugins_with(offers: Vec<Offer>, notifier: Arc<RecordingNotifier>) -> PluginManager {
    let plugins = PluginManager::new();
    plugins.register_source(Arc::new(StaticSource { offers })).await;
    plugins.register_notifier(notifier).await;
    plugins
}

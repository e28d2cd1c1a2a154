//! One collection run: fetch, filter, convert, deduplicate, queue and post.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::affiliate::{AffiliateConverter, ShopeeAffiliateClient, ValidationStatus};
use crate::config::AppConfig;
use crate::dedup::OfferDeduplicator;
use crate::filters::OfferFilter;
use crate::models::Offer;
use crate::plugins::{NotificationResult, PluginManager};
use crate::queue::{ApproveOutcome, EnqueueOutcome, OfferQueue, QueueStats, QueuedOffer};
use crate::scraper::WebScraper;
use crate::storage::OfferRepository;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub collected: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub queued: usize,
    pub held_for_moderation: usize,
    pub low_score: usize,
    pub posted: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub per_source: BTreeMap<String, usize>,
    pub source_errors: BTreeMap<String, String>,
}

pub struct DealPipeline {
    plugins: PluginManager,
    converter: AffiliateConverter,
    filter: OfferFilter,
    repository: OfferRepository,
    dedup: Mutex<OfferDeduplicator>,
    queue: Mutex<OfferQueue>,
    max_concurrent_sources: usize,
    max_offers_per_source: usize,
    max_posts_per_run: usize,
    post_delay: Duration,
    retention_days: i64,
}

impl DealPipeline {
    pub fn new(
        config: &AppConfig,
        plugins: PluginManager,
        converter: AffiliateConverter,
        repository: OfferRepository,
    ) -> Self {
        Self {
            plugins,
            converter,
            filter: OfferFilter::new(config.filters.clone()),
            repository,
            dedup: Mutex::new(OfferDeduplicator::new(
                chrono::Duration::hours(config.dedup.ttl_hours),
                config.dedup.price_tolerance_percent,
            )),
            queue: Mutex::new(OfferQueue::new(config.queue.clone())),
            max_concurrent_sources: config.scraper.max_concurrent_sources.max(1),
            max_offers_per_source: config.scraper.max_offers_per_source,
            max_posts_per_run: config.scheduler.max_posts_per_run,
            post_delay: Duration::from_millis(config.scheduler.post_delay_ms),
            retention_days: config.dedup.retention_days,
        }
    }

    /// Wire the production pipeline: one shared scraper, every enabled
    /// source, Telegram, and a converter that may use the Shopee API.
    pub async fn from_config(config: &AppConfig, pool: SqlitePool) -> Result<Self> {
        let scraper = WebScraper::new(config.scraper.clone())?;
        let plugins = PluginManager::from_config(config, scraper.clone()).await?;

        let mut converter = AffiliateConverter::new(&config.affiliate).with_scraper(scraper);
        if let Some(client) =
            ShopeeAffiliateClient::from_config(&config.affiliate.shopee, config.scraper.request_timeout)?
        {
            converter = converter.with_shopee(client);
        }

        tracing::info!(
            sources = ?plugins.list_source_types().await,
            notifiers = ?plugins.list_notifier_types().await,
            "Pipeline ready"
        );
        Ok(Self::new(config, plugins, converter, OfferRepository::new(pool)))
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn converter(&self) -> &AffiliateConverter {
        &self.converter
    }

    pub fn repository(&self) -> &OfferRepository {
        &self.repository
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.lock().await.stats()
    }

    pub async fn pending_moderation(&self) -> Vec<QueuedOffer> {
        self.queue.lock().await.pending_moderation().to_vec()
    }

    /// Approve an offer held for moderation.
    pub async fn approve(&self, id: &str) -> ApproveOutcome {
        self.queue.lock().await.approve(id)
    }

    pub async fn reject(&self, id: &str) -> bool {
        self.queue.lock().await.reject(id)
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::default();

        let expired = self.dedup.lock().await.purge_expired(chrono::Utc::now());
        if expired > 0 {
            tracing::debug!(expired, "Purged expired dedup entries");
        }
        if self.retention_days > 0 {
            if let Err(e) = self.repository.purge_older_than(self.retention_days).await {
                tracing::warn!(error = %e, "Failed to purge posted offer history");
            }
        }

        let collected = self.collect(&mut report).await;
        report.collected = collected.len();

        for offer in collected {
            self.admit(offer, &mut report).await;
        }

        self.post_queued(&mut report).await;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("garimpeiro_runs_total").increment(1);
        metrics::histogram!("garimpeiro_run_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            collected = report.collected,
            filtered = report.filtered,
            duplicates = report.duplicates,
            queued = report.queued,
            posted = report.posted,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Fetch every registered source concurrently. Source errors are recorded, never fatal.
    async fn collect(&self, report: &mut RunReport) -> Vec<Offer> {
        let limit = self.max_offers_per_source;
        let fetches: Vec<_> = self
            .plugins
            .sources()
            .await
            .into_iter()
            .map(|source| async move {
                let tag = source.source().to_string();
                tracing::debug!(source = %tag, "Fetching offers");
                (tag, source.fetch_offers(limit).await)
            })
            .collect();
        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.max_concurrent_sources)
            .collect()
            .await;

        let mut offers = Vec::new();
        for (tag, result) in results {
            match result {
                Ok(found) => {
                    metrics::counter!("garimpeiro_offers_collected_total", "source" => tag.clone())
                        .increment(found.len() as u64);
                    report.per_source.insert(tag, found.len());
                    offers.extend(found);
                }
                Err(e) => {
                    tracing::warn!(source = %tag, error = %e, "Source failed");
                    metrics::counter!("garimpeiro_source_errors_total", "source" => tag.clone()).increment(1);
                    report.per_source.insert(tag.clone(), 0);
                    report.source_errors.insert(tag, e.to_string());
                }
            }
        }
        offers
    }

    /// Validate, filter, convert and deduplicate one offer, then queue it.
    async fn admit(&self, mut offer: Offer, report: &mut RunReport) {
        if let Err(e) = offer.check() {
            tracing::debug!(url = %offer.url, error = %e, "Invalid offer");
            metrics::counter!("garimpeiro_offers_invalid_total").increment(1);
            report.invalid += 1;
            return;
        }

        let score = match self.filter.evaluate(&offer) {
            Ok(score) => score,
            Err(reason) => {
                tracing::debug!(title = %offer.title, %reason, "Offer filtered");
                metrics::counter!("garimpeiro_offers_filtered_total", "reason" => reason.label()).increment(1);
                report.filtered += 1;
                return;
            }
        };

        if offer.affiliate_url.is_none() {
            let converted = self.converter.convert(&offer.url).await;
            if converted != offer.url {
                offer.affiliate_url = Some(converted);
            }
        }
        if let Some(link) = &offer.affiliate_url {
            let validation = self.converter.validator().validate(link);
            if validation.status != ValidationStatus::Valid {
                tracing::warn!(
                    url = %link,
                    status = ?validation.status,
                    score = validation.score,
                    issues = ?validation.issues,
                    "Affiliate link did not validate"
                );
            }
        }

        let in_memory = self.dedup.lock().await.check_and_remember(&offer);
        if in_memory.is_duplicate {
            tracing::debug!(title = %offer.title, strategy = ?in_memory.strategy, "Duplicate offer");
            metrics::counter!("garimpeiro_offers_duplicate_total", "layer" => "memory").increment(1);
            report.duplicates += 1;
            return;
        }

        match self.repository.was_posted(&offer).await {
            Ok(true) => {
                metrics::counter!("garimpeiro_offers_duplicate_total", "layer" => "database").increment(1);
                report.duplicates += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(title = %offer.title, error = %e, "Posted-offer lookup failed");
                report.failed += 1;
                return;
            }
        }

        match self.queue.lock().await.enqueue(offer, score) {
            EnqueueOutcome::Queued { .. } => report.queued += 1,
            EnqueueOutcome::HeldForModeration { .. } => report.held_for_moderation += 1,
            EnqueueOutcome::Rejected => report.low_score += 1,
            EnqueueOutcome::Dropped => report.failed += 1,
        }
    }

    async fn post_queued(&self, report: &mut RunReport) {
        if self.plugins.notifiers().await.is_empty() {
            tracing::warn!("No notifier registered, leaving offers queued");
            return;
        }

        let batch = self.queue.lock().await.pop_many(self.max_posts_per_run);
        for (idx, entry) in batch.into_iter().enumerate() {
            if idx > 0 && !self.post_delay.is_zero() {
                tokio::time::sleep(self.post_delay).await;
            }
            match self.post_offer(&entry.offer).await {
                Ok(_) => report.posted += 1,
                Err(e) => {
                    tracing::warn!(title = %entry.offer.title, error = %e, "Failed to post offer");
                    report.failed += 1;
                }
            }
        }
    }

    /// Send one offer through every notifier and record it once any of them succeeded.
    pub async fn post_offer(&self, offer: &Offer) -> Result<NotificationResult> {
        let mut delivered = None;
        let mut last_error = None;

        for notifier in self.plugins.notifiers().await {
            match notifier.notify(offer).await {
                Ok(result) if result.success => delivered = Some(result),
                Ok(result) => {
                    last_error = Some(AppError::plugin(
                        notifier.plugin_type(),
                        result.error.unwrap_or_else(|| "notification not delivered".to_string()),
                    ))
                }
                Err(e) => last_error = Some(e),
            }
        }

        let Some(result) = delivered else {
            metrics::counter!("garimpeiro_posts_failed_total").increment(1);
            return Err(last_error.unwrap_or_else(|| AppError::Internal("no notifier registered".to_string())));
        };

        metrics::counter!("garimpeiro_offers_posted_total", "store" => offer.store.clone()).increment(1);
        if !self.repository.record_posted(offer).await? {
            tracing::debug!(title = %offer.title, "Posted offer was already on record");
        }
        Ok(result)
    }

    /// Convert and post an offer supplied by hand, bypassing filters and the queue.
    pub async fn post_manual(&self, mut offer: Offer) -> Result<NotificationResult> {
        offer.check()?;
        if offer.affiliate_url.is_none() {
            let converted = self.converter.convert(&offer.url).await;
            if converted != offer.url {
                offer.affiliate_url = Some(converted);
            }
        }
        self.post_offer(&offer).await
    }
}

//! SQLite persistence for posted offers and runtime settings.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::models::{Offer, PostedOffer, Setting};
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct StoreCount {
    pub store: String,
    pub total: i64,
}

/// Open the pool described by `config`, creating the database file if needed.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    let path = config
        .url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if !path.is_empty() && !path.contains(":memory:") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout))
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Posted-offer history. Backs the persistent half of deduplication.
#[derive(Clone)]
pub struct OfferRepository {
    pool: SqlitePool,
}

impl OfferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn exists_by_hash(&self, offer_hash: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM posted_offers WHERE offer_hash = ? LIMIT 1")
            .bind(offer_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn exists_by_product(&self, product_id: &str, store: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM posted_offers WHERE product_id = ? AND store = ? LIMIT 1")
                .bind(product_id)
                .bind(store)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM posted_offers WHERE url = ? OR affiliate_url = ? LIMIT 1")
                .bind(url)
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Any of hash, product id or URL already on record.
    pub async fn was_posted(&self, offer: &Offer) -> Result<bool> {
        if self.exists_by_hash(&offer.offer_hash()).await? {
            return Ok(true);
        }
        if let Some(product_id) = offer.product_id.as_deref() {
            if self.exists_by_product(product_id, &offer.store).await? {
                return Ok(true);
            }
        }
        self.exists_by_url(&offer.url).await
    }

    /// Insert a posted offer. `Ok(false)` when the hash or product was already recorded.
    pub async fn record_posted(&self, offer: &Offer) -> Result<bool> {
        let row = PostedOffer::from_offer(offer);
        let result = sqlx::query(
            r"
            INSERT INTO posted_offers
                (id, product_id, store, title, price, original_price, url, affiliate_url,
                 image_url, source, offer_hash, posted_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(&row.id)
        .bind(&row.product_id)
        .bind(&row.store)
        .bind(&row.title)
        .bind(&row.price)
        .bind(&row.original_price)
        .bind(&row.url)
        .bind(&row.affiliate_url)
        .bind(&row.image_url)
        .bind(row.source)
        .bind(&row.offer_hash)
        .bind(row.posted_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            tracing::debug!(hash = %row.offer_hash, "Offer already recorded");
        }
        Ok(inserted)
    }

    /// Most recently posted first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<PostedOffer>> {
        let rows = sqlx::query_as::<_, PostedOffer>(
            "SELECT * FROM posted_offers ORDER BY posted_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posted_offers")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn stats_by_store(&self) -> Result<Vec<StoreCount>> {
        let rows = sqlx::query_as::<_, StoreCount>(
            "SELECT store, COUNT(*) AS total FROM posted_offers GROUP BY store ORDER BY total DESC, store ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete history older than `days`. Returns the number of rows removed.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM posted_offers WHERE posted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::info!(removed = result.rows_affected(), days, "Purged posted offer history");
        }
        Ok(result.rows_affected())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let setting = sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(setting)
    }

    pub async fn set_setting(&self, setting: &Setting) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value, description, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, settings.description),
                updated_at = excluded.updated_at
            ",
        )
        .bind(&setting.key)
        .bind(&setting.value)
        .bind(&setting.description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

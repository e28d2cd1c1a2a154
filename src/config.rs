use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub affiliate: AffiliateConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub filters: FilterConfig,
    pub queue: QueueConfig,
    pub dedup: DedupConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub channel_url: String,
    pub admin_user_id: Option<i64>,
    pub api_base: String,
    pub disable_web_page_preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateConfig {
    pub amazon_tag: String,
    pub amazon_domain: String,
    pub awin: AwinConfig,
    pub magalu: MagaluConfig,
    pub mercado_livre: MercadoLivreConfig,
    /// Store slug -> query parameter rule.
    pub query_params: HashMap<String, QueryParamRule>,
    pub shopee: ShopeeConfig,
    pub max_concurrent_conversions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwinConfig {
    pub publisher_id: String,
    /// Store slug -> Awin merchant id.
    pub merchants: HashMap<String, String>,
    /// Store slug -> publisher id, for stores approved under a different publisher.
    pub publisher_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MagaluMode {
    Storefront,
    Partner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagaluConfig {
    pub mode: MagaluMode,
    pub storefront: String,
    pub partner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MercadoLivreConfig {
    pub matt_word: String,
    pub matt_tool: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryParamRule {
    pub param: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopeeConfig {
    pub app_id: Option<String>,
    pub secret: Option<String>,
    pub endpoint: String,
    pub sub_id: Option<String>,
}

impl ShopeeConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.app_id.as_deref(), self.secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub enabled_sources: Vec<String>,
    pub max_concurrent_sources: usize,
    pub max_offers_per_source: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout: u64,
    pub min_domain_interval_ms: u64,
    pub max_backoff_secs: u64,
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six or seven field cron expression (seconds first).
    pub cron: String,
    pub max_posts_per_run: usize,
    pub post_delay_ms: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub keywords: Vec<String>,
    pub min_price: Decimal,
    pub max_price: Option<Decimal>,
    pub min_discount_percent: u32,
    pub require_discount: bool,
    pub require_keyword: bool,
    pub blocked_terms: Vec<String>,
    pub boost_keywords: Vec<String>,
    pub reduce_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_size: usize,
    pub auto_approve_threshold: f64,
    pub auto_reject_threshold: f64,
    pub moderation_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub ttl_hours: i64,
    pub retention_days: i64,
    pub price_tolerance_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub directory: Option<String>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Bare variable names used by older deployments, mapped onto config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
    ("TELEGRAM_CHAT_ID", "telegram.chat_id"),
    ("AMAZON_ASSOCIATE_TAG", "affiliate.amazon_tag"),
    ("SHOPEE_APP_ID", "affiliate.shopee.app_id"),
    ("SHOPEE_API_KEY", "affiliate.shopee.app_id"),
    ("SHOPEE_SECRET", "affiliate.shopee.secret"),
    ("SHOPEE_API_SECRET", "affiliate.shopee.secret"),
];

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false));

        for (var, key) in LEGACY_ENV {
            if let Ok(value) = env::var(var) {
                if !value.trim().is_empty() {
                    builder = builder.set_override(*key, value)?;
                }
            }
        }

        // Overrides from legacy names are applied after every source, prefixed env included.
        let s = builder
            .add_source(Environment::with_prefix("GARIMPEIRO").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a complete TOML document. Used by tests and tooling that ship their own config.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Message(format!("Invalid TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Message(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.enabled && self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message("Database min_connections cannot exceed max_connections".into()));
        }

        if Url::parse(&self.telegram.api_base).is_err() {
            return Err(ConfigError::Message("Invalid telegram.api_base URL".into()));
        }

        if Url::parse(&self.telegram.channel_url).is_err() {
            return Err(ConfigError::Message("Invalid telegram.channel_url URL".into()));
        }

        if self.affiliate.amazon_tag.trim().is_empty() {
            return Err(ConfigError::Message("affiliate.amazon_tag must not be empty".into()));
        }

        if self.affiliate.amazon_domain.trim().is_empty() || self.affiliate.amazon_domain.contains('/') {
            return Err(ConfigError::Message("affiliate.amazon_domain must be a bare domain suffix like com.br".into()));
        }

        if Url::parse(&self.affiliate.shopee.endpoint).is_err() {
            return Err(ConfigError::Message("Invalid affiliate.shopee.endpoint URL".into()));
        }

        if self.affiliate.max_concurrent_conversions == 0 {
            return Err(ConfigError::Message("affiliate.max_concurrent_conversions must be greater than 0".into()));
        }

        if self.scraper.max_concurrent_sources == 0 {
            return Err(ConfigError::Message("Scraper max_concurrent_sources must be greater than 0".into()));
        }

        if self.scraper.user_agents.is_empty() {
            return Err(ConfigError::Message("Scraper user_agents must contain at least one entry".into()));
        }

        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if self.scheduler.max_posts_per_run == 0 {
            return Err(ConfigError::Message("Scheduler max_posts_per_run must be greater than 0".into()));
        }

        if let Some(max) = self.filters.max_price {
            if max < self.filters.min_price {
                return Err(ConfigError::Message("filters.max_price cannot be lower than filters.min_price".into()));
            }
        }

        if self.queue.max_size == 0 {
            return Err(ConfigError::Message("Queue max_size must be greater than 0".into()));
        }

        if !(0.0..=1.0).contains(&self.queue.auto_approve_threshold)
            || !(0.0..=1.0).contains(&self.queue.auto_reject_threshold)
        {
            return Err(ConfigError::Message("Queue thresholds must be between 0 and 1".into()));
        }

        if self.queue.auto_reject_threshold >= self.queue.auto_approve_threshold {
            return Err(ConfigError::Message("Queue auto_reject_threshold must be lower than auto_approve_threshold".into()));
        }

        if self.dedup.ttl_hours <= 0 {
            return Err(ConfigError::Message("Dedup ttl_hours must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

/// tokio-cron-scheduler expressions: sec min hour day month weekday [year].
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?' | '#')
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DEFAULT_TOML: &str = include_str!("../config/default.toml");

    fn valid_config() -> AppConfig {
        AppConfig::from_toml_str(DEFAULT_TOML).expect("default config must be valid")
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = valid_config();
        assert_eq!(config.affiliate.amazon_tag, "garimpeirogee-20");
        assert_eq!(config.affiliate.amazon_domain, "com.br");
        assert_eq!(config.scheduler.post_delay_ms, 250);
        assert_eq!(config.affiliate.awin.merchants.get("kabum").map(String::as_str), Some("17729"));
        assert_eq!(config.affiliate.magalu.mode, MagaluMode::Storefront);
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = valid_config();
        config.server.enabled = true;
        config.server.port = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("port must be greater than 0"));
    }

    #[test]
    fn test_disabled_server_ignores_port() {
        let mut config = valid_config();
        config.server.enabled = false;
        config.server.port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_db_connections() {
        let mut config = valid_config();
        config.database.min_connections = 15;
        config.database.max_connections = 10;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("min_connections cannot exceed max_connections"));
    }

    #[test]
    fn test_config_validation_empty_amazon_tag() {
        let mut config = valid_config();
        config.affiliate.amazon_tag = "  ".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("amazon_tag"));
    }

    #[test]
    fn test_config_validation_invalid_cron() {
        let mut config = valid_config();
        config.scheduler.cron = "0 0 * * *".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid cron expression"));
    }

    #[test]
    fn test_config_validation_queue_thresholds() {
        let mut config = valid_config();
        config.queue.auto_reject_threshold = 0.9;
        config.queue.auto_approve_threshold = 0.8;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("auto_reject_threshold"));
    }

    #[test]
    fn test_config_validation_price_range() {
        let mut config = valid_config();
        config.filters.min_price = Decimal::from(100);
        config.filters.max_price = Some(Decimal::from(50));

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("max_price"));
    }

    #[rstest]
    #[case("0 */30 * * * *", true)]
    #[case("0 0 9-22 * * *", true)]
    #[case("0 0 12 * * Mon-Fri", true)]
    #[case("0 0 12 1 * * 2030", true)]
    #[case("*/15 * * * *", false)]
    #[case("invalid", false)]
    #[case("0 0 * * $ *", false)]
    #[case("", false)]
    fn test_cron_validation(#[case] expr: &str, #[case] expected: bool) {
        assert_eq!(is_valid_cron(expr), expected, "cron {:?}", expr);
    }

    #[test]
    fn test_shopee_credentials_require_both_values() {
        let mut config = valid_config();
        config.affiliate.shopee.app_id = Some("123".to_string());
        config.affiliate.shopee.secret = None;
        assert!(config.affiliate.shopee.credentials().is_none());

        config.affiliate.shopee.secret = Some("s3cret".to_string());
        assert_eq!(config.affiliate.shopee.credentials(), Some(("123", "s3cret")));
    }

    #[test]
    fn test_toml_round_trip_keeps_sections() {
        let config = valid_config();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[affiliate.awin]"));
        let reparsed = AppConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed.telegram.api_base, config.telegram.api_base);
    }
}

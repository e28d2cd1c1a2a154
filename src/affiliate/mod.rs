pub mod asin;
pub mod rules;
pub mod shopee;
pub mod stores;
pub mod validator;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::config::AffiliateConfig;
use crate::scraper::WebScraper;

pub use asin::{extract_asin, extract_asin_from_html};
pub use rules::{AffiliateRule, RuleTable};
pub use shopee::ShopeeAffiliateClient;
pub use stores::{detect_store, store_name, StoreDef, STORES};
pub use validator::{AffiliateValidator, ValidationReport, ValidationStatus};

const MAX_UNWRAP_DEPTH: usize = 3;
const EMBEDDED_URL_PARAMS: &[&str] = &["url", "u", "redirect", "ued"];
const AMAZON_SHORTLINK_HOSTS: &[&str] = &["amzn.to", "a.co", "amzn.eu"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversion {
    pub original: String,
    pub converted: String,
    pub store: Option<String>,
    pub rule: Option<String>,
    pub validation: ValidationReport,
}

fn parse_http(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

/// Follow `url=`/`u=`/`redirect=`/`ued=` wrappers down to the real target.
fn unwrap_embedded(url: Url) -> Url {
    let mut current = url;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner = current
            .query_pairs()
            .find(|(name, _)| EMBEDDED_URL_PARAMS.contains(&name.as_ref()))
            .and_then(|(_, value)| parse_http(&value));
        match inner {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// The product link behind aggregator redirect wrappers, or the input unchanged.
pub fn outbound_link(raw: &str) -> String {
    parse_http(raw)
        .map(|url| unwrap_embedded(url).to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn is_amazon_shortlink(url: &str) -> bool {
    stores::host_of(url).is_some_and(|host| AMAZON_SHORTLINK_HOSTS.contains(&host.as_str()))
}

/// Turns product links into affiliate links.
///
/// [`canonicalize`](Self::canonicalize) is pure and idempotent. [`convert`](Self::convert)
/// may also expand short links, read product pages and call the Shopee API,
/// and falls back to the pure form whenever one of those fails.
#[derive(Clone)]
pub struct AffiliateConverter {
    rules: Arc<RuleTable>,
    validator: Arc<AffiliateValidator>,
    scraper: Option<WebScraper>,
    shopee: Option<ShopeeAffiliateClient>,
    max_concurrent: usize,
}

impl AffiliateConverter {
    pub fn new(config: &AffiliateConfig) -> Self {
        Self {
            rules: Arc::new(RuleTable::from_config(config)),
            validator: Arc::new(AffiliateValidator::new(config)),
            scraper: None,
            shopee: None,
            max_concurrent: config.max_concurrent_conversions.max(1),
        }
    }

    pub fn with_scraper(mut self, scraper: WebScraper) -> Self {
        self.scraper = Some(scraper);
        self
    }

    pub fn with_shopee(mut self, client: ShopeeAffiliateClient) -> Self {
        self.shopee = Some(client);
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn validator(&self) -> &AffiliateValidator {
        &self.validator
    }

    fn resolve(&self, raw: &str) -> Option<(Url, &'static StoreDef, &AffiliateRule)> {
        let target = unwrap_embedded(parse_http(raw)?);
        let store = stores::detect_store(target.as_str())?;
        let rule = self.rules.rule_for(store.slug)?;
        Some((target, store, rule))
    }

    /// Affiliate form of `raw` using only URL rewriting.
    ///
    /// Unparseable links, unknown stores and stores without a usable rule
    /// come back unchanged.
    pub fn canonicalize(&self, raw: &str) -> String {
        self.resolve(raw)
            .and_then(|(target, _, rule)| rule.apply(&target))
            .unwrap_or_else(|| raw.to_string())
    }

    pub async fn convert(&self, raw: &str) -> String {
        let input = raw.trim();

        let expanded = match &self.scraper {
            Some(scraper) if is_amazon_shortlink(input) => scraper.resolve_redirect(input).await,
            _ => input.to_string(),
        };

        let canonical = self.canonicalize(&expanded);
        let store = stores::detect_store(&expanded).map(|s| s.slug);

        match store {
            Some("amazon") if canonical == expanded => {
                if let Some(converted) = self.convert_amazon_from_page(&expanded).await {
                    return converted;
                }
            }
            Some("shopee") => {
                if let Some(client) = &self.shopee {
                    match client.short_link(&canonical).await {
                        Ok(short) => return short,
                        Err(e) => tracing::warn!(url = %canonical, error = %e, "Shopee short link failed"),
                    }
                }
            }
            _ => {}
        }

        if canonical == expanded && expanded != input {
            // No rule applied to the expanded link
            return self.canonicalize(input);
        }
        canonical
    }

    async fn convert_amazon_from_page(&self, url: &str) -> Option<String> {
        let scraper = self.scraper.as_ref()?;
        let rule = self.rules.rule_for("amazon")?;
        let html = scraper.fetch_html(url).await.into_html().ok()?;
        let (asin, strategy) = extract_asin_from_html(&html)?;
        tracing::debug!(url, asin = %asin, ?strategy, "ASIN found in product page");

        let product = Url::parse(&format!("https://www.amazon.com.br/dp/{}", asin)).ok()?;
        rule.apply(&product)
    }

    /// Convert many links, keeping input order.
    pub async fn convert_batch(&self, urls: &[String]) -> Vec<String> {
        stream::iter(urls)
            .map(|url| self.convert(url))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    pub async fn convert_detailed(&self, raw: &str) -> Conversion {
        let converted = self.convert(raw).await;
        let resolved = self.resolve(raw);
        Conversion {
            original: raw.to_string(),
            store: stores::detect_store(&converted)
                .or_else(|| resolved.as_ref().map(|(_, store, _)| *store))
                .map(|s| s.name.to_string()),
            rule: resolved.map(|(_, _, rule)| rule.kind().to_string()),
            validation: self.validator.validate(&converted),
            converted,
        }
    }
}

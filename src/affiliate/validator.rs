//! Scores a converted link on whether it will actually earn commission.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::affiliate::stores::{self, host_of};
use crate::config::{AffiliateConfig, MagaluMode};

const GENERIC_TRACKING_PREFIXES: &[&str] = &["utm_"];
const GENERIC_TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid", "ref_", "tracking_id"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Warning,
    Invalid,
    Unsupported,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationChecks {
    pub url_format: f64,
    pub required_params: f64,
    pub domain: f64,
    pub shortlink: f64,
    pub clean: f64,
}

impl ValidationChecks {
    pub fn score(&self) -> f64 {
        self.url_format * 0.30
            + self.required_params * 0.25
            + self.domain * 0.20
            + self.shortlink * 0.15
            + self.clean * 0.10
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub url: String,
    pub platform: Option<String>,
    pub status: ValidationStatus,
    pub score: f64,
    pub checks: ValidationChecks,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
struct PlatformPattern {
    shortlink: Option<Regex>,
    affiliate: Option<Regex>,
    /// Parameter name and, when fixed, its expected value.
    required: Vec<(String, Option<String>)>,
    domains: Vec<String>,
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "Invalid affiliate pattern");
            None
        }
    }
}

pub struct AffiliateValidator {
    patterns: HashMap<String, PlatformPattern>,
}

impl AffiliateValidator {
    pub fn new(config: &AffiliateConfig) -> Self {
        let mut patterns = HashMap::new();

        patterns.insert(
            "amazon".to_string(),
            PlatformPattern {
                shortlink: compile(r"^https?://(amzn\.to|a\.co)/[A-Za-z0-9/]+$"),
                affiliate: compile(r"^https://www\.amazon\.[a-z.]+/dp/[A-Z0-9]{10}\?tag=[^&]+"),
                required: vec![("tag".to_string(), Some(config.amazon_tag.clone()))],
                domains: vec!["amazon.com.br".into(), "amazon.com".into(), "amzn.to".into(), "a.co".into()],
            },
        );

        let ml = &config.mercado_livre;
        patterns.insert(
            "mercadolivre".to_string(),
            PlatformPattern {
                shortlink: compile(r"^https?://(www\.)?mercadolivre\.com/sec/[A-Za-z0-9]+$"),
                affiliate: compile(r"[?&]matt_word=[^&]+&matt_tool=[^&]+"),
                required: vec![
                    ("matt_word".to_string(), Some(ml.matt_word.clone())),
                    ("matt_tool".to_string(), Some(ml.matt_tool.clone())),
                ],
                domains: vec!["mercadolivre.com.br".into(), "mercadolivre.com".into()],
            },
        );

        patterns.insert(
            "shopee".to_string(),
            PlatformPattern {
                shortlink: compile(r"^https?://(s\.shopee\.com\.br|shp\.ee)/[A-Za-z0-9]+$"),
                affiliate: None,
                required: vec![],
                domains: vec!["shopee.com.br".into(), "shp.ee".into()],
            },
        );

        patterns.insert(
            "aliexpress".to_string(),
            PlatformPattern {
                shortlink: compile(r"^https?://s\.click\.aliexpress\.com/e/[A-Za-z0-9_-]+$"),
                affiliate: None,
                required: vec![],
                domains: vec!["aliexpress.com".into()],
            },
        );

        let magalu = match config.magalu.mode {
            MagaluMode::Storefront => PlatformPattern {
                shortlink: None,
                affiliate: compile(&format!(
                    r"^https://www\.magazinevoce\.com\.br/{}/",
                    regex::escape(&config.magalu.storefront)
                )),
                required: vec![],
                domains: vec!["magazinevoce.com.br".into()],
            },
            MagaluMode::Partner => PlatformPattern {
                shortlink: None,
                affiliate: compile(r"[?&]partner_id=[^&]+"),
                required: vec![("partner_id".to_string(), Some(config.magalu.partner_id.clone()))],
                domains: vec!["magazineluiza.com.br".into()],
            },
        };
        patterns.insert("magalu".to_string(), magalu);

        patterns.insert(
            "awin".to_string(),
            PlatformPattern {
                shortlink: compile(r"^https?://tidd\.ly/[A-Za-z0-9]+$"),
                affiliate: compile(r"^https://www\.awin1\.com/cread\.php\?awinmid=\d+&awinaffid=\d+&ued="),
                required: vec![
                    ("awinmid".to_string(), None),
                    ("awinaffid".to_string(), None),
                    ("ued".to_string(), None),
                ],
                domains: vec!["awin1.com".into(), "tidd.ly".into()],
            },
        );

        for (slug, rule) in &config.query_params {
            if rule.param.is_empty() || rule.value.is_empty() {
                continue;
            }
            let domains = stores::find_by_slug(slug)
                .map(|s| s.domains.iter().map(|d| d.to_string()).collect())
                .unwrap_or_default();
            patterns.insert(
                slug.clone(),
                PlatformPattern {
                    shortlink: None,
                    affiliate: compile(&format!(r"[?&]{}=[^&]+", regex::escape(&rule.param))),
                    required: vec![(rule.param.clone(), Some(rule.value.clone()))],
                    domains,
                },
            );
        }

        Self { patterns }
    }

    fn identify_platform(&self, host: &str) -> Option<String> {
        if host == "awin1.com" || host.ends_with(".awin1.com") || host == "tidd.ly" {
            return Some("awin".to_string());
        }
        if host == "s.click.aliexpress.com" {
            return Some("aliexpress".to_string());
        }
        let store = stores::detect_store_by_host(host)?;
        self.patterns
            .contains_key(store.slug)
            .then(|| store.slug.to_string())
    }

    pub fn validate(&self, raw: &str) -> ValidationReport {
        let mut issues = Vec::new();
        let parsed = Url::parse(raw.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some());

        let Some(url) = parsed else {
            return ValidationReport {
                url: raw.to_string(),
                platform: None,
                status: ValidationStatus::Invalid,
                score: 0.0,
                checks: ValidationChecks::default(),
                issues: vec!["not an http(s) URL".to_string()],
            };
        };

        let host = host_of(url.as_str()).unwrap_or_default();
        let Some(platform) = self.identify_platform(&host) else {
            return ValidationReport {
                url: raw.to_string(),
                platform: None,
                status: ValidationStatus::Unsupported,
                score: 0.0,
                checks: ValidationChecks::default(),
                issues: vec![format!("no affiliate program for {}", host)],
            };
        };
        let pattern = &self.patterns[&platform];
        let text = url.as_str();

        let is_shortlink = pattern.shortlink.as_ref().is_some_and(|re| re.is_match(text));
        let is_affiliate = pattern.affiliate.as_ref().is_some_and(|re| re.is_match(text));

        let url_format = if is_shortlink || is_affiliate { 1.0 } else { 0.5 };
        if url_format < 1.0 {
            issues.push("link does not match the affiliate format".to_string());
        }

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let required_params = if is_shortlink || pattern.required.is_empty() {
            1.0
        } else {
            let satisfied = pattern
                .required
                .iter()
                .filter(|(name, expected)| match (pairs.get(name), expected) {
                    (Some(value), Some(expected)) => value == expected,
                    (Some(value), None) => !value.is_empty(),
                    (None, _) => false,
                })
                .count();
            if satisfied < pattern.required.len() {
                issues.push("missing or wrong affiliate parameters".to_string());
            }
            satisfied as f64 / pattern.required.len() as f64
        };

        let domain = if pattern
            .domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        {
            1.0
        } else {
            issues.push(format!("unexpected domain {}", host));
            0.0
        };

        let shortlink = if is_shortlink {
            1.0
        } else if is_affiliate {
            0.7
        } else if text.len() > 200 {
            0.3
        } else {
            0.5
        };

        let dirty = pairs.keys().any(|name| {
            let name = name.to_lowercase();
            GENERIC_TRACKING_PREFIXES.iter().any(|p| name.starts_with(p))
                || GENERIC_TRACKING_PARAMS.contains(&name.as_str())
        });
        let clean = if dirty {
            issues.push("carries tracking parameters".to_string());
            0.0
        } else {
            1.0
        };

        let checks = ValidationChecks {
            url_format,
            required_params,
            domain,
            shortlink,
            clean,
        };
        let score = checks.score();
        let status = if score >= 0.9 {
            ValidationStatus::Valid
        } else if score >= 0.5 {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Invalid
        };

        ValidationReport {
            url: raw.to_string(),
            platform: Some(platform),
            status,
            score,
            checks,
            issues,
        }
    }
}

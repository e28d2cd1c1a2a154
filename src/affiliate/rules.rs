use std::collections::HashMap;
use url::form_urlencoded;
use url::Url;

use crate::affiliate::asin::extract_asin;
use crate::config::{AffiliateConfig, MagaluMode};

const MAGALU_STOREFRONT_HOST: &str = "www.magazinevoce.com.br";

/// Mercado Livre parameters that only carry search or ad tracking.
const ML_TRACKING_PARAMS: &[&str] = &[
    "tracking_id",
    "wid",
    "sid",
    "deal_print_id",
    "searchvariation",
    "search_layout",
    "is_advertising",
    "polycard_client",
    "c_id",
    "c_uid",
    "position",
    "type",
];

fn is_ml_tracking(name: &str) -> bool {
    let name = name.to_lowercase();
    name.starts_with("ad_") || name.starts_with("reco_") || ML_TRACKING_PARAMS.contains(&name.as_str())
}

/// How a store's product URL becomes an affiliate link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffiliateRule {
    Amazon { tag: String, domain: String },
    QueryParam { param: String, value: String },
    Awin { merchant_id: String, publisher_id: String },
    MagaluStorefront { storefront: String },
    MercadoLivre { matt_word: String, matt_tool: String },
    Disabled,
}

impl AffiliateRule {
    pub fn kind(&self) -> &'static str {
        match self {
            AffiliateRule::Amazon { .. } => "amazon",
            AffiliateRule::QueryParam { .. } => "query_param",
            AffiliateRule::Awin { .. } => "awin",
            AffiliateRule::MagaluStorefront { .. } => "magalu_storefront",
            AffiliateRule::MercadoLivre { .. } => "mercado_livre",
            AffiliateRule::Disabled => "disabled",
        }
    }

    /// Affiliate form of `url`, or `None` when the rule cannot apply.
    ///
    /// Applying a rule to its own output yields the same string.
    pub fn apply(&self, url: &Url) -> Option<String> {
        match self {
            AffiliateRule::Amazon { tag, domain } => {
                let asin = extract_asin(url.as_str())?;
                Some(format!(
                    "https://www.amazon.{}/dp/{}?tag={}&language=pt_BR",
                    domain, asin, tag
                ))
            }
            AffiliateRule::QueryParam { param, value } => {
                let mut out = url.clone();
                rebuild_query(&mut out, |name| name != param.as_str(), &[(param.as_str(), value.as_str())]);
                Some(out.to_string())
            }
            AffiliateRule::Awin { merchant_id, publisher_id } => {
                let encoded: String = form_urlencoded::byte_serialize(url.as_str().as_bytes()).collect();
                Some(format!(
                    "https://www.awin1.com/cread.php?awinmid={}&awinaffid={}&ued={}",
                    merchant_id, publisher_id, encoded
                ))
            }
            AffiliateRule::MagaluStorefront { storefront } => Some(magalu_storefront_url(url, storefront)),
            AffiliateRule::MercadoLivre { matt_word, matt_tool } => {
                let path = url.path();
                // Already-shortened social links carry their own attribution
                if path.starts_with("/sec/") || path.starts_with("/social/") {
                    return Some(url.to_string());
                }
                let mut out = url.clone();
                out.set_fragment(None);
                rebuild_query(
                    &mut out,
                    |name| {
                        !is_ml_tracking(name)
                            && !matches!(name, "matt_word" | "matt_tool" | "forceInApp")
                    },
                    &[
                        ("matt_word", matt_word.as_str()),
                        ("matt_tool", matt_tool.as_str()),
                        ("forceInApp", "true"),
                    ],
                );
                Some(out.to_string())
            }
            AffiliateRule::Disabled => None,
        }
    }
}

fn magalu_storefront_url(url: &Url, storefront: &str) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // Storefront URLs lead with the storefront name; swap it for ours
    let rest: &[&str] = if host.ends_with("magazinevoce.com.br") && !segments.is_empty() {
        &segments[1..]
    } else {
        &segments
    };

    let trailing_slash = url.path().ends_with('/') && !rest.is_empty();
    let mut out = format!("https://{}/{}", MAGALU_STOREFRONT_HOST, storefront);
    for segment in rest {
        out.push('/');
        out.push_str(segment);
    }
    if trailing_slash || rest.is_empty() {
        out.push('/');
    }
    out
}

/// Keep the pairs accepted by `keep`, then append `extra` in order.
fn rebuild_query<F>(url: &mut Url, keep: F, extra: &[(&str, &str)])
where
    F: Fn(&str) -> bool,
{
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| keep(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() && extra.is_empty() {
        url.set_query(None);
        return;
    }

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (name, value) in &kept {
        pairs.append_pair(name, value);
    }
    for (name, value) in extra {
        pairs.append_pair(name, value);
    }
}

/// Store slug to rule, built from configuration.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, AffiliateRule>,
}

impl RuleTable {
    pub fn from_config(config: &AffiliateConfig) -> Self {
        let mut rules = HashMap::new();

        if !config.amazon_tag.trim().is_empty() {
            rules.insert(
                "amazon".to_string(),
                AffiliateRule::Amazon {
                    tag: config.amazon_tag.trim().to_string(),
                    domain: config.amazon_domain.trim().to_string(),
                },
            );
        }

        let ml = &config.mercado_livre;
        if !ml.matt_word.is_empty() && !ml.matt_tool.is_empty() {
            rules.insert(
                "mercadolivre".to_string(),
                AffiliateRule::MercadoLivre {
                    matt_word: ml.matt_word.clone(),
                    matt_tool: ml.matt_tool.clone(),
                },
            );
        }

        let magalu_rule = match config.magalu.mode {
            MagaluMode::Storefront if !config.magalu.storefront.is_empty() => AffiliateRule::MagaluStorefront {
                storefront: config.magalu.storefront.clone(),
            },
            MagaluMode::Partner if !config.magalu.partner_id.is_empty() => AffiliateRule::QueryParam {
                param: "partner_id".to_string(),
                value: config.magalu.partner_id.clone(),
            },
            _ => AffiliateRule::Disabled,
        };
        rules.insert("magalu".to_string(), magalu_rule);

        // Converted through their own APIs, never by URL rewriting
        rules.insert("shopee".to_string(), AffiliateRule::Disabled);
        rules.insert("aliexpress".to_string(), AffiliateRule::Disabled);

        for (slug, rule) in &config.query_params {
            if !rule.param.is_empty() && !rule.value.is_empty() {
                rules.insert(
                    slug.clone(),
                    AffiliateRule::QueryParam {
                        param: rule.param.clone(),
                        value: rule.value.clone(),
                    },
                );
            }
        }

        if !config.awin.publisher_id.is_empty() {
            for (slug, merchant_id) in &config.awin.merchants {
                let publisher_id = config
                    .awin
                    .publisher_overrides
                    .get(slug)
                    .unwrap_or(&config.awin.publisher_id);
                rules.insert(
                    slug.clone(),
                    AffiliateRule::Awin {
                        merchant_id: merchant_id.clone(),
                        publisher_id: publisher_id.clone(),
                    },
                );
            }
        }

        Self { rules }
    }

    pub fn rule_for(&self, slug: &str) -> Option<&AffiliateRule> {
        self.rules.get(slug)
    }

    pub fn insert(&mut self, slug: impl Into<String>, rule: AffiliateRule) {
        self.rules.insert(slug.into(), rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

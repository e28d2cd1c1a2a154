//! Offer fingerprints and short-term duplicate detection.
//!
//! `offer_hash` is the persistent identity stored next to each posted offer.
//! [`OfferDeduplicator`] catches repeats inside one process before they reach
//! the database, using progressively looser strategies.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use url::Url;

use crate::affiliate::asin::extract_asin;
use crate::models::Offer;
use crate::price::parse_brl;
use crate::utils::hash::sha256_hex;

const TITLE_STOP_WORDS: &[&str] = &["frete", "gratis", "grátis", "envio", "entrega"];

const STORE_ALIASES: &[(&str, &str)] = &[
    ("mercado livre", "mercadolivre"),
    ("ml", "mercadolivre"),
    ("magazine luiza", "magalu"),
    ("magazine você", "magalu"),
    ("kabum!", "kabum"),
    ("amazon.com.br", "amazon"),
    ("amazon brasil", "amazon"),
    ("casas bahia", "casasbahia"),
    ("fast shop", "fastshop"),
];

/// Query parameters that only carry attribution or analytics.
const TRACKING_PARAMS: &[&str] = &[
    "ref", "ref_", "tag", "gclid", "fbclid", "msclkid", "awinaffid", "clickref", "matt_word",
    "matt_tool", "forceinapp", "tracking_id", "partner_id", "afiliado", "sid", "wid",
    "deal_print_id", "spm", "psc", "smid", "th", "language", "linkcode", "creative", "camp",
];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_lowercase();
    name.starts_with("utm_")
        || name.starts_with("ad_")
        || name.starts_with("reco_")
        || TRACKING_PARAMS.contains(&name.as_str())
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid dedup regex"))
}

fn non_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"[^\w\s]")
}

/// Host without `www.`, lowercased.
fn bare_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Store-level product identity, when the URL carries one.
fn product_identity(host: &str, path: &str) -> Option<String> {
    static ML: OnceLock<Regex> = OnceLock::new();
    static SHOPEE: OnceLock<Regex> = OnceLock::new();
    static ALI: OnceLock<Regex> = OnceLock::new();
    static PRODUTO: OnceLock<Regex> = OnceLock::new();

    if host.contains("amazon.") {
        let asin = extract_asin(&format!("https://{}{}", host, path))?;
        return Some(format!("amazon/dp/{}", asin.to_lowercase()));
    }
    if host.contains("mercadolivre") {
        let caps = re(&ML, r"mlb-?(\d+)").captures(path)?;
        return Some(format!("mercadolivre/mlb{}", &caps[1]));
    }
    if host.contains("shopee") {
        let caps = re(&SHOPEE, r"(?:-i\.|/product/)(\d+)[./](\d+)").captures(path)?;
        return Some(format!("shopee/product/{}/{}", &caps[1], &caps[2]));
    }
    if host.contains("aliexpress") {
        let caps = re(&ALI, r"/(?:item|i)/(\d+)\.html").captures(path)?;
        return Some(format!("aliexpress/item/{}", &caps[1]));
    }
    let caps = re(&PRODUTO, r"/produto/(\d+)").captures(path)?;
    Some(format!("{}/produto/{}", host, &caps[1]))
}

/// Host + path form used for hashing. Store product ids win over the literal path.
pub fn normalize_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.trim().to_lowercase();
    };

    let host = bare_host(&url);
    let path = url.path().to_lowercase();
    let path = path.trim_end_matches('/');

    match product_identity(&host, path) {
        Some(identity) => identity,
        None => format!("{}{}", host, path),
    }
}

pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned = non_word_regex().replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 1 && !TITLE_STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_price(price: &str) -> String {
    let stripped: String = price.replace("R$", "").split_whitespace().collect();
    match parse_brl(&stripped) {
        Some(value) => format!("{:.2}", value.round_dp(2)),
        None => stripped,
    }
}

pub fn normalize_store(store: &str) -> String {
    let lowered = store.trim().to_lowercase();
    let aliased = STORE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lowered);
    aliased.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// SHA-256 over the normalised url, title, price and store, joined by `|`.
pub fn offer_hash(url: &str, title: &str, price: &str, store: &str) -> String {
    let key = format!(
        "{}|{}|{}|{}",
        normalize_url(url),
        normalize_title(title),
        normalize_price(price),
        normalize_store(store)
    );
    sha256_hex(&key)
}

/// URL with fragment and tracking parameters removed and the rest sorted.
pub fn canonical_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.trim().to_lowercase();
    };

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let host = bare_host(&url);
    let path = url.path().trim_end_matches('/').to_string();
    if params.is_empty() {
        format!("{}{}", host, path)
    } else {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{}?{}", host, path, query)
    }
}

/// Jaccard similarity over normalised title tokens.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a_norm = normalize_title(a);
    let b_norm = normalize_title(b);
    let a_tokens: HashSet<&str> = a_norm.split_whitespace().collect();
    let b_tokens: HashSet<&str> = b_norm.split_whitespace().collect();
    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count() as f64;
    let union = a_tokens.union(&b_tokens).count() as f64;
    intersection / union
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    CanonicalUrl,
    Asin,
    TitlePriceStore,
    Fingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicationResult {
    pub is_duplicate: bool,
    pub strategy: Option<DedupStrategy>,
    pub similarity: f64,
}

impl DuplicationResult {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            strategy: None,
            similarity: 0.0,
        }
    }

    fn duplicate(strategy: DedupStrategy, similarity: f64) -> Self {
        Self {
            is_duplicate: true,
            strategy: Some(strategy),
            similarity,
        }
    }
}

#[derive(Debug, Clone)]
struct SeenOffer {
    canonical_url: String,
    asin: Option<String>,
    title: String,
    store_key: String,
    price: Decimal,
    seen_at: DateTime<Utc>,
}

/// In-memory duplicate filter whose entries expire after a TTL.
pub struct OfferDeduplicator {
    ttl: Duration,
    price_tolerance_percent: u32,
    title_threshold: f64,
    seen: HashMap<String, SeenOffer>,
}

impl OfferDeduplicator {
    pub fn new(ttl: Duration, price_tolerance_percent: u32) -> Self {
        Self {
            ttl,
            price_tolerance_percent,
            title_threshold: 0.8,
            seen: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn check(&mut self, offer: &Offer) -> DuplicationResult {
        self.check_at(offer, Utc::now())
    }

    pub fn check_at(&mut self, offer: &Offer, now: DateTime<Utc>) -> DuplicationResult {
        self.purge_expired(now);

        let canonical = canonical_url(&offer.url);
        let asin = extract_asin(&offer.url);
        let store_key = normalize_store(&offer.store);

        if self.seen.values().any(|s| s.canonical_url == canonical) {
            return DuplicationResult::duplicate(DedupStrategy::CanonicalUrl, 1.0);
        }

        if let Some(asin) = &asin {
            if self.seen.values().any(|s| s.asin.as_ref() == Some(asin)) {
                return DuplicationResult::duplicate(DedupStrategy::Asin, 1.0);
            }
        }

        let best_title_match = self
            .seen
            .values()
            .filter(|s| s.store_key == store_key && self.price_within_tolerance(s.price, offer.price))
            .map(|s| title_similarity(&s.title, &offer.title))
            .fold(0.0_f64, f64::max);
        if best_title_match >= self.title_threshold {
            return DuplicationResult::duplicate(DedupStrategy::TitlePriceStore, best_title_match);
        }

        if self.seen.contains_key(&offer.offer_hash()) {
            return DuplicationResult::duplicate(DedupStrategy::Fingerprint, 1.0);
        }

        DuplicationResult {
            similarity: best_title_match,
            ..DuplicationResult::unique()
        }
    }

    pub fn remember(&mut self, offer: &Offer) {
        self.remember_at(offer, Utc::now());
    }

    pub fn remember_at(&mut self, offer: &Offer, now: DateTime<Utc>) {
        self.seen.insert(
            offer.offer_hash(),
            SeenOffer {
                canonical_url: canonical_url(&offer.url),
                asin: extract_asin(&offer.url),
                title: offer.title.clone(),
                store_key: normalize_store(&offer.store),
                price: offer.price,
                seen_at: now,
            },
        );
    }

    /// Check and, when unique, remember in one step.
    pub fn check_and_remember(&mut self, offer: &Offer) -> DuplicationResult {
        let now = Utc::now();
        let result = self.check_at(offer, now);
        if !result.is_duplicate {
            self.remember_at(offer, now);
        }
        result
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        let ttl = self.ttl;
        self.seen.retain(|_, s| now - s.seen_at < ttl);
        before - self.seen.len()
    }

    fn price_within_tolerance(&self, a: Decimal, b: Decimal) -> bool {
        let reference = a.max(b);
        if reference.is_zero() {
            return true;
        }
        let diff = (a - b).abs();
        diff * Decimal::from(100) <= reference * Decimal::from(self.price_tolerance_percent)
    }
}

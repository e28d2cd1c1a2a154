//! Amazon product identifier (ASIN) extraction from URLs and product pages.

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

use crate::scraper::selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsinStrategy {
    UrlPath,
    QueryParam,
    HtmlInput,
    HtmlDataAttribute,
    HtmlCanonical,
    HtmlJsonLd,
}

fn path_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?i)/dp/([A-Z0-9]{10})(?:[/?#&]|$)",
            r"(?i)/gp/product/([A-Z0-9]{10})(?:[/?#&]|$)",
            r"(?i)/gp/aw/d/([A-Z0-9]{10})(?:[/?#&]|$)",
            r"(?i)/product/([A-Z0-9]{10})(?:[/?#&]|$)",
            r"(?i)/exec/obidos/ASIN/([A-Z0-9]{10})(?:[/?#&]|$)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid asin path regex"))
        .collect()
    })
}

fn query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[?&]asin=([A-Z0-9]{10})(?:[&#]|$)").expect("valid asin query regex")
    })
}

fn bare_asin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{10}$").expect("valid asin regex"))
}

fn json_ld_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(B0[A-Z0-9]{8})\b").expect("valid json-ld asin regex"))
}

pub fn is_asin(candidate: &str) -> bool {
    bare_asin_regex().is_match(candidate)
}

/// ASIN from a product URL, uppercased.
pub fn extract_asin(url: &str) -> Option<String> {
    extract_asin_with_strategy(url).map(|(asin, _)| asin)
}

pub fn extract_asin_with_strategy(url: &str) -> Option<(String, AsinStrategy)> {
    if let Some(caps) = path_regexes().iter().find_map(|re| re.captures(url)) {
        return Some((caps[1].to_uppercase(), AsinStrategy::UrlPath));
    }
    query_regex()
        .captures(url)
        .map(|caps| (caps[1].to_uppercase(), AsinStrategy::QueryParam))
}

/// ASIN from a product page, for links whose URL does not carry one.
pub fn extract_asin_from_html(html: &str) -> Option<(String, AsinStrategy)> {
    let document = Html::parse_document(html);

    let input = selector(r#"input#ASIN, input[name="ASIN"], input[name="asin"]"#);
    if let Some(asin) = document
        .select(&input)
        .filter_map(|el| el.value().attr("value"))
        .map(|v| v.trim().to_uppercase())
        .find(|v| is_asin(v))
    {
        return Some((asin, AsinStrategy::HtmlInput));
    }

    let data_asin = selector("[data-asin]");
    if let Some(asin) = document
        .select(&data_asin)
        .filter_map(|el| el.value().attr("data-asin"))
        .map(|v| v.trim().to_uppercase())
        .find(|v| is_asin(v))
    {
        return Some((asin, AsinStrategy::HtmlDataAttribute));
    }

    let canonical = selector(r#"meta[property="og:url"], link[rel="canonical"]"#);
    if let Some(asin) = document
        .select(&canonical)
        .filter_map(|el| el.value().attr("content").or_else(|| el.value().attr("href")))
        .find_map(extract_asin)
    {
        return Some((asin, AsinStrategy::HtmlCanonical));
    }

    let json_ld = selector(r#"script[type="application/ld+json"]"#);
    document
        .select(&json_ld)
        .map(|el| el.text().collect::<String>())
        .find_map(|text| json_ld_regex().captures(&text).map(|c| c[1].to_string()))
        .map(|asin| (asin, AsinStrategy::HtmlJsonLd))
}

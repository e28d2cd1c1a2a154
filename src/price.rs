//! Brazilian real (BRL) price parsing and formatting.
//!
//! Retail pages mix `R$ 1.999,90`, `1999,90`, `R$1999.90` and bare `R$ 49`.
//! Everything is normalised into [`Decimal`] so comparisons never go through floats.

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d.,]*").expect("valid number regex"))
}

fn card_price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,3}(?:\.\d{3})+,\d{2}|\d+,\d{2}").expect("valid price regex"))
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("valid percent regex"))
}

/// Parse the first price found in `text`.
///
/// The last `.` or `,` is the decimal separator only when it is followed by
/// one or two digits; every other separator is a thousands mark.
pub fn parse_brl(text: &str) -> Option<Decimal> {
    let token = number_regex().find(text)?.as_str();
    let token = token.trim_end_matches(['.', ',']);
    if token.is_empty() {
        return None;
    }

    let decimal_pos = token
        .rfind(['.', ','])
        .filter(|&pos| {
            let tail = &token[pos + 1..];
            (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit())
        });

    let mut normalized = String::with_capacity(token.len());
    for (idx, ch) in token.char_indices() {
        match ch {
            '.' | ',' if Some(idx) == decimal_pos => normalized.push('.'),
            '.' | ',' => {}
            digit => normalized.push(digit),
        }
    }

    Decimal::from_str(&normalized).ok()
}

/// Format as `1.999,90`.
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{}{},{}", if negative { "-" } else { "" }, grouped, frac_part)
}

/// Format as `R$ 1.999,90`.
pub fn format_brl_with_symbol(value: Decimal) -> String {
    format!("R$ {}", format_brl(value))
}

/// Whole-percent discount, only when `original > current > 0`.
pub fn discount_percent(original: Decimal, current: Decimal) -> Option<u32> {
    if current <= Decimal::ZERO || original <= current {
        return None;
    }
    let pct = (original - current) / original * Decimal::from(100);
    pct.floor().to_u32()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardPrices {
    pub current: Option<Decimal>,
    pub original: Option<Decimal>,
    pub discount_percent: Option<u32>,
}

/// Pull prices out of a deal card's flattened text.
///
/// The smallest price is the current one. The largest becomes the original
/// price when the card shows a percentage or the gap exceeds 10%.
pub fn extract_card_prices(text: &str) -> CardPrices {
    let prices: Vec<Decimal> = card_price_regex()
        .find_iter(text)
        .filter_map(|m| parse_brl(m.as_str()))
        .filter(|p| *p > Decimal::ZERO)
        .collect();

    let discount = percent_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|pct| *pct > 0 && *pct < 100);

    let current = prices.iter().min().copied();
    let highest = prices.iter().max().copied();

    let original = match (current, highest) {
        (Some(low), Some(high)) if high > low => {
            let gap_over_ten_percent = high > low * Decimal::new(110, 2);
            (discount.is_some() || gap_over_ten_percent).then_some(high)
        }
        _ => None,
    };

    CardPrices {
        current,
        original,
        discount_percent: discount,
    }
}

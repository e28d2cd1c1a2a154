//! Telegram MarkdownV2 rendering of offers and parsing of the `/oferta` admin command.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::models::Offer;
use crate::price::{format_brl, parse_brl};
use crate::utils::error::{AppError, Result};

const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escape every MarkdownV2 reserved character.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 4);
    for ch in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Inside `(...)` of an inline link only `)` and `\` are reserved.
fn escape_link_target(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

/// Inside inline code only `` ` `` and `\` are reserved.
fn escape_code(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`")
}

pub fn share_url(link: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(link.as_bytes()).collect();
    format!("https://t.me/share/url?url={}", encoded)
}

fn brl(value: Decimal) -> String {
    escape_markdown_v2(&format_brl(value))
}

/// Channel post for `offer`, in MarkdownV2.
pub fn format_offer_message(offer: &Offer) -> String {
    let mut lines: Vec<String> = Vec::new();

    if offer.is_lowest_price {
        lines.push("🔥📉 *MENOR PREÇO HISTÓRICO\\!* 📉🔥".to_string());
        lines.push(String::new());
    }

    lines.push(format!("🔥 *{}*", escape_markdown_v2(&offer.title)));
    lines.push(String::new());

    match (offer.original_price, offer.discount_percent()) {
        (Some(original), Some(discount)) => {
            lines.push(format!(
                "💰 *De* ~R$ {}~ *por* R$ {}",
                brl(original),
                brl(offer.price)
            ));
            lines.push(format!(
                "💵 *Preço:* R$ {} \\(*{}% de desconto*\\)",
                brl(offer.price),
                discount
            ));
        }
        _ => lines.push(format!("💵 *Preço:* R$ {}", brl(offer.price))),
    }

    if let Some(coupon) = &offer.coupon {
        let mut line = format!("🎫 *Cupom:* `{}`", escape_code(&coupon.code));
        if let Some(pct) = coupon.discount_percent {
            line.push_str(&format!(" \\({}% OFF\\)", pct));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!("🏪 *Loja:* {}", escape_markdown_v2(&offer.store)));
    lines.push(String::new());

    let link = offer.link();
    lines.push(format!("🛒 [Ver oferta]({})", escape_link_target(link)));
    lines.push(format!(
        "🔗 [Gostou? Compartilhe\\!]({})",
        escape_link_target(&share_url(link))
    ));

    lines.join("\n")
}

/// A manual post request: `/oferta <link> <preço> <título...>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminCommand {
    pub link: String,
    pub price: Decimal,
    pub title: String,
}

pub fn parse_admin_command(text: &str) -> Result<AdminCommand> {
    let mut parts = text.split_whitespace();
    let usage = || AppError::parse("Uso: /oferta <link> <preço> <título completo>");

    let command = parts.next().ok_or_else(usage)?;
    // Telegram appends the bot name in groups: /oferta@garimpeiro_bot
    if command.split('@').next() != Some("/oferta") {
        return Err(usage());
    }

    let link = parts.next().ok_or_else(usage)?;
    if !(link.starts_with("http://") || link.starts_with("https://")) {
        return Err(AppError::parse(format!("Link inválido: {}", link)));
    }

    let price_text = parts.next().ok_or_else(usage)?;
    let price = parse_brl(price_text)
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| AppError::parse(format!("Preço inválido: {}", price_text)))?;

    let title = parts.collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return Err(usage());
    }

    Ok(AdminCommand {
        link: link.to_string(),
        price,
        title,
    })
}

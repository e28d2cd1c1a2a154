//! Client for the Shopee affiliate GraphQL API.
//!
//! Every request is signed with `SHA256(app_id + timestamp + payload + secret)`
//! and the payload sent must be byte-identical to the one signed.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::ShopeeConfig;
use crate::models::{NewOffer, Offer, OfferSource};
use crate::price::parse_brl;
use crate::utils::error::{AppError, Result};
use crate::utils::hash::sha256_hex;

const SERVICE: &str = "Shopee";

const PRODUCT_OFFERS_QUERY: &str = "query ProductOffers($keyword: String, $limit: Int, $page: Int) { \
productOfferV2(keyword: $keyword, limit: $limit, page: $page, sortType: 2) { \
nodes { itemId productName price priceMin priceMax priceDiscountRate imageUrl shopName offerLink productLink sales ratingStar commissionRate } \
pageInfo { page limit hasNextPage } } }";

const SHORT_LINK_MUTATION: &str = "mutation GenerateShortLink($originUrl: String!, $subIds: [String]) { \
generateShortLink(input: { originUrl: $originUrl, subIds: $subIds }) { shortLink } }";

pub fn sign(app_id: &str, timestamp: i64, payload: &str, secret: &str) -> String {
    sha256_hex(&format!("{}{}{}{}", app_id, timestamp, payload, secret))
}

pub fn authorization_header(app_id: &str, timestamp: i64, payload: &str, secret: &str) -> String {
    format!(
        "SHA256 Credential={}, Timestamp={}, Signature={}",
        app_id,
        timestamp,
        sign(app_id, timestamp, payload, secret)
    )
}

/// Accept a JSON string or number and keep its text.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopeeProduct {
    #[serde(default, deserialize_with = "string_or_number")]
    pub item_id: Option<String>,
    pub product_name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price_min: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price_max: Option<String>,
    #[serde(default)]
    pub price_discount_rate: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub offer_link: Option<String>,
    #[serde(default)]
    pub product_link: Option<String>,
    #[serde(default)]
    pub sales: Option<i64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub rating_star: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub commission_rate: Option<String>,
}

impl ShopeeProduct {
    pub fn into_offer(self) -> Option<Offer> {
        let price = self
            .price
            .as_deref()
            .or(self.price_min.as_deref())
            .and_then(parse_brl)?;

        // Shopee reports the discount, not the list price
        let original_price = self
            .price_discount_rate
            .filter(|rate| *rate > 0.0 && *rate < 100.0)
            .and_then(|rate| Decimal::from_f64(1.0 - rate / 100.0))
            .filter(|factor| !factor.is_zero())
            .map(|factor| (price / factor).round_dp(2));

        let url = self.product_link.clone().or_else(|| self.offer_link.clone())?;

        let mut offer = Offer::new(NewOffer {
            title: self.product_name,
            price,
            original_price,
            url,
            image_url: self.image_url,
            store: "Shopee".to_string(),
            source: OfferSource::Shopee,
            product_id: self.item_id,
            coupon: None,
        });
        offer.affiliate_url = self.offer_link;
        Some(offer)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductOfferPage {
    nodes: Vec<ShopeeProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductOfferData {
    product_offer_v2: ProductOfferPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLink {
    short_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLinkData {
    generate_short_link: ShortLink,
}

#[derive(Clone)]
pub struct ShopeeAffiliateClient {
    http: reqwest::Client,
    app_id: String,
    secret: String,
    endpoint: String,
    sub_id: Option<String>,
}

impl ShopeeAffiliateClient {
    /// `None` when credentials are not configured.
    pub fn from_config(config: &ShopeeConfig, timeout_secs: u64) -> Result<Option<Self>> {
        let Some((app_id, secret)) = config.credentials() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Some(Self {
            http,
            app_id: app_id.to_string(),
            secret: secret.to_string(),
            endpoint: config.endpoint.clone(),
            sub_id: config.sub_id.clone(),
        }))
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T> {
        let payload = serde_json::to_string(&json!({ "query": query, "variables": variables }))?;
        let timestamp = chrono::Utc::now().timestamp();

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(
                AUTHORIZATION,
                authorization_header(&self.app_id, timestamp, &payload, &self.secret),
            )
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::api(SERVICE, format!("HTTP {}", status)));
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(AppError::api(SERVICE, messages.join("; ")));
        }
        body.data
            .ok_or_else(|| AppError::api(SERVICE, "response carried no data"))
    }

    pub async fn product_offers(&self, keyword: &str, limit: usize) -> Result<Vec<ShopeeProduct>> {
        let data: ProductOfferData = self
            .graphql(
                PRODUCT_OFFERS_QUERY,
                json!({ "keyword": keyword, "limit": limit, "page": 1 }),
            )
            .await?;
        tracing::debug!(keyword, count = data.product_offer_v2.nodes.len(), "Shopee product offers");
        Ok(data.product_offer_v2.nodes)
    }

    pub async fn short_link(&self, origin_url: &str) -> Result<String> {
        let sub_ids: Vec<&str> = self.sub_id.as_deref().into_iter().collect();
        let data: ShortLinkData = self
            .graphql(
                SHORT_LINK_MUTATION,
                json!({ "originUrl": origin_url, "subIds": sub_ids }),
            )
            .await?;
        Ok(data.generate_short_link.short_link)
    }
}

use super::*;
use garimpeiro_geek::affiliate::shopee::{sign, ShopeeAffiliateClient};
use garimpeiro_geek::config::ShopeeConfig;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_ID: &str = "18312340001";
const SECRET: &str = "segredo-de-teste";

fn client(endpoint: String) -> anyhow::Result<ShopeeAffiliateClient> {
    let config = ShopeeConfig {
        app_id: Some(APP_ID.to_string()),
        secret: Some(SECRET.to_string()),
        endpoint,
        sub_id: Some("telegram".to_string()),
    };
    ShopeeAffiliateClient::from_config(&config, 5)?.ok_or_else(|| anyhow::anyhow!("credentials were ignored"))
}

fn short_link_response(link: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": { "generateShortLink": { "shortLink": link } }
    }))
}

/// Pull `Timestamp` and `Signature` out of the SHA256 authorization header.
fn parse_authorization(header: &str) -> Option<(String, i64, String)> {
    let rest = header.strip_prefix("SHA256 ")?;
    let mut credential = None;
    let mut timestamp = None;
    let mut signature = None;
    for part in rest.split(", ") {
        let (key, value) = part.split_once('=')?;
        match key {
            "Credential" => credential = Some(value.to_string()),
            "Timestamp" => timestamp = value.parse().ok(),
            "Signature" => signature = Some(value.to_string()),
            _ => {}
        }
    }
    Some((credential?, timestamp?, signature?))
}

#[tokio::test]
async fn test_short_link_request_is_signed_over_the_exact_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header_exists("authorization"))
        .respond_with(short_link_response("https://s.shopee.com.br/9zXyW"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(format!("{}/graphql", server.uri()))?;
    let short = client.short_link("https://shopee.com.br/product/123/456").await?;
    assert_eq!(short, "https://s.shopee.com.br/9zXyW");

    let requests = server.received_requests().await.unwrap_or_default();
    let request = &requests[0];
    let header = request
        .headers
        .iter()
        .find(|(name, _)| name.as_str().eq_ignore_ascii_case("authorization"))
        // wiremock splits header values on commas; stitch them back together
        .map(|(_, values)| values.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    let (credential, timestamp, signature) = parse_authorization(&header).expect("well-formed header");
    let body = String::from_utf8(request.body.clone())?;

    assert_eq!(credential, APP_ID);
    assert_eq!(signature, sign(APP_ID, timestamp, &body, SECRET));
    assert_eq!(signature.len(), 64);

    let payload: Value = serde_json::from_str(&body)?;
    assert_eq!(payload["variables"]["originUrl"], "https://shopee.com.br/product/123/456");
    assert_eq!(payload["variables"]["subIds"], json!(["telegram"]));
    Ok(())
}

#[tokio::test]
async fn test_converter_uses_short_link_for_shopee() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(short_link_response("https://s.shopee.com.br/AbC12"))
        .mount(&server)
        .await;

    let config = get_test_config();
    let converter = AffiliateConverter::new(&config.affiliate).with_shopee(client(server.uri())?);

    let converted = converter.convert("https://shopee.com.br/Fone-Bluetooth-i.123.456").await;
    assert_eq!(converted, "https://s.shopee.com.br/AbC12");
    Ok(())
}

#[tokio::test]
async fn test_converter_keeps_link_when_shopee_fails() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = get_test_config();
    let converter = AffiliateConverter::new(&config.affiliate).with_shopee(client(server.uri())?);

    let link = "https://shopee.com.br/Fone-Bluetooth-i.123.456";
    assert_eq!(converter.convert(link).await, link);
    Ok(())
}

#[test]
fn test_missing_credentials_disable_the_client() {
    let config = ShopeeConfig {
        app_id: Some(APP_ID.to_string()),
        secret: None,
        endpoint: "https://open-api.affiliate.shopee.com.br/graphql".to_string(),
        sub_id: None,
    };
    assert!(matches!(ShopeeAffiliateClient::from_config(&config, 5), Ok(None)));
}

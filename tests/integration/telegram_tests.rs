use super::*;
use garimpeiro_geek::config::TelegramConfig;
use garimpeiro_geek::plugins::notifiers::TelegramNotifier;
use garimpeiro_geek::AppError;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn telegram_config(api_base: &str) -> TelegramConfig {
    TelegramConfig {
        bot_token: "TEST".to_string(),
        chat_id: "@garimpeirogeek".to_string(),
        channel_url: "https://t.me/garimpeirogeek".to_string(),
        admin_user_id: None,
        api_base: api_base.to_string(),
        disable_web_page_preview: true,
    }
}

fn ok(message_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "message_id": message_id } }))
}

fn offer_with_image() -> Offer {
    let mut offer = sample_offer(
        "Monitor LG UltraGear 27\"",
        "1299.00",
        Some("1899.00"),
        "https://www.kabum.com.br/produto/42",
        "KaBuM!",
    );
    offer.image_url = Some("https://images.kabum.com.br/monitor.jpg".to_string());
    offer
}

#[tokio::test]
async fn test_notify_sends_photo_with_caption() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST/sendPhoto"))
        .respond_with(ok(7))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(telegram_config(&server.uri()))?;
    let result = notifier.notify(&offer_with_image()).await?;

    assert!(result.success);
    assert_eq!(result.message_id, Some(7));

    let requests = server.received_requests().await.unwrap_or_default();
    let payload: Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(payload["chat_id"], "@garimpeirogeek");
    assert_eq!(payload["parse_mode"], "MarkdownV2");
    assert_eq!(payload["photo"], "https://images.kabum.com.br/monitor.jpg");
    assert!(payload["caption"].as_str().is_some_and(|c| c.contains("Monitor LG UltraGear")));
    assert_eq!(payload["reply_markup"]["inline_keyboard"][0][1]["url"], "https://t.me/garimpeirogeek");
    Ok(())
}

#[tokio::test]
async fn test_notify_falls_back_to_text_when_photo_fails() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST/sendPhoto"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: wrong file identifier/HTTP URL specified"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/botTEST/sendMessage"))
        .respond_with(ok(8))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(telegram_config(&server.uri()))?;
    let result = notifier.notify(&offer_with_image()).await?;

    assert_eq!(result.message_id, Some(8));
    Ok(())
}

#[tokio::test]
async fn test_api_error_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(telegram_config(&server.uri()))?;
    let err = notifier.send_text("teste").await.unwrap_err();

    match err {
        AppError::Api { service, message } => {
            assert_eq!(service, "Telegram");
            assert!(message.contains("chat not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_connection_uses_get_me() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "id": 1, "is_bot": true, "username": "garimpeiro_bot" }
        })))
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(telegram_config(&server.uri()))?;
    assert_ok!(notifier.test_connection().await);
    assert_eq!(notifier.bot_username().await?, "garimpeiro_bot");
    Ok(())
}

#[tokio::test]
async fn test_connection_fails_with_bad_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTEST/getMe"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(telegram_config(&server.uri()))?;
    assert_err!(notifier.test_connection().await);
    Ok(())
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::formatter::format_offer_message;
use crate::models::Offer;
use crate::plugins::traits::{NotificationResult, NotifierPlugin};
use crate::utils::error::{AppError, Result};

const SERVICE: &str = "Telegram";
const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    pub fn build_keyboard(&self, link: &str) -> Value {
        json!({
            "inline_keyboard": [[
                { "text": "🛒 Ver Oferta", "url": link },
                { "text": "📢 Ver Canal", "url": self.config.channel_url }
            ]]
        })
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| AppError::api(SERVICE, format!("{} returned HTTP {}: {}", method, status, e)))?;

        if !body.ok {
            return Err(AppError::api(
                SERVICE,
                body.description.unwrap_or_else(|| format!("{} failed with HTTP {}", method, status)),
            ));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    fn message_id(result: &Value) -> Option<i64> {
        result.get("message_id").and_then(Value::as_i64)
    }

    pub async fn send_photo(&self, photo_url: &str, caption: &str, keyboard: Value) -> Result<Option<i64>> {
        let result = self
            .call(
                "sendPhoto",
                json!({
                    "chat_id": self.config.chat_id,
                    "photo": photo_url,
                    "caption": caption,
                    "parse_mode": "MarkdownV2",
                    "reply_markup": keyboard,
                }),
            )
            .await?;
        Ok(Self::message_id(&result))
    }

    pub async fn send_message(&self, text: &str, keyboard: Option<Value>) -> Result<Option<i64>> {
        let mut payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": self.config.disable_web_page_preview,
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard;
        }
        let result = self.call("sendMessage", payload).await?;
        Ok(Self::message_id(&result))
    }

    /// Bot username reported by `getMe`.
    pub async fn bot_username(&self) -> Result<String> {
        let result = self.call("getMe", json!({})).await?;
        result
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::api(SERVICE, "getMe returned no username"))
    }
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn plugin_type(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, offer: &Offer) -> Result<NotificationResult> {
        let message = format_offer_message(offer);
        let keyboard = self.build_keyboard(offer.link());

        let image = offer
            .image_url
            .as_deref()
            .filter(|_| message.chars().count() <= CAPTION_LIMIT);

        if let Some(image) = image {
            match self.send_photo(image, &message, keyboard.clone()).await {
                Ok(message_id) => return Ok(NotificationResult::sent(message_id)),
                Err(e) => {
                    tracing::warn!(store = %offer.store, error = %e, "sendPhoto failed, falling back to text");
                }
            }
        }

        let message_id = self.send_message(&message, Some(keyboard)).await?;
        tracing::info!(store = %offer.store, title = %offer.title, "Offer posted");
        Ok(NotificationResult::sent(message_id))
    }

    async fn send_text(&self, text: &str) -> Result<NotificationResult> {
        let message_id = self.send_message(text, None).await?;
        Ok(NotificationResult::sent(message_id))
    }

    async fn test_connection(&self) -> Result<bool> {
        let username = self.bot_username().await?;
        tracing::info!(bot = %username, "Telegram connection ok");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:ABC".to_string(),
            chat_id: "@garimpeirogeek".to_string(),
            channel_url: "https://t.me/garimpeirogeek".to_string(),
            admin_user_id: None,
            api_base: "https://api.telegram.org/".to_string(),
            disable_web_page_preview: true,
        }
    }

    #[test]
    fn test_notifier_metadata() {
        let notifier = TelegramNotifier::new(config()).unwrap();
        assert_eq!(notifier.plugin_type(), "telegram");
    }

    #[test]
    fn test_method_url() {
        let notifier = TelegramNotifier::new(config()).unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_keyboard_layout() {
        let notifier = TelegramNotifier::new(config()).unwrap();
        let keyboard = notifier.build_keyboard("https://amzn.to/x");
        let row = keyboard["inline_keyboard"][0].as_array().unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0]["text"], "🛒 Ver Oferta");
        assert_eq!(row[0]["url"], "https://amzn.to/x");
        assert_eq!(row[1]["text"], "📢 Ver Canal");
        assert_eq!(row[1]["url"], "https://t.me/garimpeirogeek");
    }
}

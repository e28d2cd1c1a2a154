use super::*;
use garimpeiro_geek::plugins::notifiers::TelegramNotifier;
use garimpeiro_geek::plugins::sources::PromobitSource;
use garimpeiro_geek::scraper::WebScraper;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROMOBIT_PAGE: &str = r#"
<html><body>
  <article>
    <a href="https://www.kabum.com.br/produto/461699/ssd-kingston-nv2">
      <img src="https://i.promobit.com.br/ssd.jpg">
      <span class="line-clamp-2">SSD Kingston NV2 1TB</span>
    </a>
    <span>R$ 499,90</span><span>R$ 379,90</span><span>24% OFF</span>
  </article>
  <article>
    <a href="https://www.amazon.com.br/Kindle/dp/B0CP31L73X/ref=sr_1_1"><h3>Kindle 16GB</h3></a>
    <span>R$ 474,05</span>
    <span class="badge">Menor preço</span>
  </article>
  <article>
    <a href="https://www.kabum.com.br/produto/99/notebook"><h3>Notebook Dell usado</h3></a>
    <span>R$ 1.999,00</span>
  </article>
</body></html>
"#;

async fn mount_telegram(server: &MockServer, telegram_method: &str, message_id: i64) {
    Mock::given(method("POST"))
        .and(path(format!("/botTEST/{telegram_method}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": message_id }
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn telegram_payloads(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/botTEST/"))
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

#[tokio::test]
async fn test_promobit_to_telegram() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PROMOBIT_PAGE))
        .mount(&server)
        .await;
    mount_telegram(&server, "sendPhoto", 101).await;
    mount_telegram(&server, "sendMessage", 102).await;

    let mut config = get_test_config();
    config.telegram.bot_token = "TEST".to_string();
    config.telegram.chat_id = "@garimpeirogeek".to_string();
    config.telegram.api_base = server.uri();

    let scraper = WebScraper::new(config.scraper.clone())?;
    let plugins = PluginManager::new();
    plugins
        .register_source(Arc::new(PromobitSource::with_base_url(scraper, format!("{}/", server.uri()))))
        .await;
    plugins
        .register_notifier(Arc::new(TelegramNotifier::new(config.telegram.clone())?))
        .await;
    let pipeline = create_test_pipeline(&config, plugins).await?;

    let report = pipeline.run_once().await?;

    assert_eq!(report.collected, 3);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.posted, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.per_source.get("promobit"), Some(&3));
    assert_eq!(pipeline.repository().count().await?, 2);

    // Historic low goes first, as text since it has no image
    let payloads = telegram_payloads(&server).await;
    assert_eq!(payloads.len(), 2);
    let kindle_link = payloads[0]["reply_markup"]["inline_keyboard"][0][0]["url"]
        .as_str()
        .unwrap_or_default();
    assert!(payloads[0]["text"].as_str().is_some_and(|t| t.contains("MENOR PREÇO")));
    assert!(kindle_link.contains("/dp/B0CP31L73X?tag=garimpeirogee-20"));

    let ssd_link = payloads[1]["reply_markup"]["inline_keyboard"][0][0]["url"]
        .as_str()
        .unwrap_or_default();
    assert!(ssd_link.starts_with("https://www.awin1.com/cread.php?awinmid=17729"));

    let second = pipeline.run_once().await?;
    assert_eq!(second.collected, 3);
    assert_eq!(second.duplicates, 2);
    assert_eq!(second.posted, 0);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_source_is_not_fatal() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = get_test_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let plugins = plugins_with(
        vec![sample_offer(
            "Teclado Mecânico Redragon",
            "189.90",
            Some("259.90"),
            "https://www.kabum.com.br/produto/77",
            "KaBuM!",
        )],
        Arc::clone(&notifier),
    )
    .await;
    let scraper = WebScraper::new(config.scraper.clone())?;
    // Registered under a different tag so both sources run
    plugins
        .register_source(Arc::new(
            garimpeiro_geek::plugins::sources::FastShopSource::with_base_url(scraper, format!("{}/ofertas", server.uri())),
        ))
        .await;
    let pipeline = create_test_pipeline(&config, plugins).await?;

    let report = pipeline.run_once().await?;

    assert!(report.source_errors.contains_key("fast_shop"));
    assert_eq!(report.posted, 1);
    assert_eq!(notifier.titles(), vec!["Teclado Mecânico Redragon"]);
    Ok(())
}

#[tokio::test]
async fn test_manual_post_bypasses_filters() -> anyhow::Result<()> {
    let config = get_test_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = create_test_pipeline(&config, plugins_with(Vec::new(), Arc::clone(&notifier)).await).await?;

    let mut offer = sample_offer("Cabo HDMI", "8.90", None, "https://www.amazon.com.br/dp/B0ABCDEFGH", "Amazon");
    offer.source = OfferSource::Manual;
    let result = pipeline.post_manual(offer).await?;

    assert!(result.success);
    assert_eq!(notifier.titles(), vec!["Cabo HDMI"]);
    let recent = pipeline.repository().recent(1).await?;
    assert!(recent[0]
        .affiliate_url
        .as_deref()
        .is_some_and(|link| link.contains("tag=garimpeirogee-20")));
    Ok(())
}

use super::*;
use axum::http::{Method, StatusCode};
use garimpeiro_geek::web::create_router;
use serde_json::json;

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    let app = create_router(state);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "garimpeiro-geek");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_stats_reflect_posted_offers() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    let repository = state.pipeline.repository().clone();
    repository
        .record_posted(&sample_offer("SSD 1TB", "379.90", None, "https://www.kabum.com.br/produto/1", "KaBuM!"))
        .await?;
    repository
        .record_posted(&sample_offer("Mouse Gamer", "99.90", None, "https://www.kabum.com.br/produto/2", "KaBuM!"))
        .await?;
    repository
        .record_posted(&sample_offer("Kindle", "474.05", None, "https://www.amazon.com.br/dp/B0CP31L73X", "Amazon"))
        .await?;
    let app = create_router(state);

    let (status, body) = make_request(&app, Method::GET, "/api/v1/stats", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["posted_total"], 3);
    assert_eq!(data["by_store"][0], json!({ "store": "KaBuM!", "total": 2 }));
    assert_eq!(data["scheduler"]["completed_runs"], 0);
    assert_eq!(data["queue"]["pending"], 0);
    Ok(())
}

#[tokio::test]
async fn test_list_offers_limits() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    for id in 1..=3 {
        let offer = sample_offer(
            &format!("Produto {id}"),
            "50.00",
            None,
            &format!("https://www.kabum.com.br/produto/{id}"),
            "KaBuM!",
        );
        state.pipeline.repository().record_posted(&offer).await?;
    }
    let app = create_router(state);

    let (status, body) = make_request(&app, Method::GET, "/api/v1/offers?limit=2", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["meta"]["limit"], 2);

    let (status, body) = make_request(&app, Method::GET, "/api/v1/offers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));

    for bad in ["0", "101"] {
        let (status, body) = make_request(&app, Method::GET, &format!("/api/v1/offers?limit={bad}"), None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
    Ok(())
}

#[tokio::test]
async fn test_convert_link() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    let app = create_router(state);

    let url = "https://www.amazon.com.br/Kindle/dp/B0CP31L73X/ref=sr_1_1";
    let (status, body) = make_request(&app, Method::POST, "/api/v1/convert", Some(json!({ "url": url }))).await?;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["original"], url);
    assert_eq!(data["store"], "Amazon");
    assert!(data["converted"]
        .as_str()
        .is_some_and(|c| c.contains("/dp/B0CP31L73X?tag=garimpeirogee-20")));
    assert!(data["validation"].is_object());
    Ok(())
}

#[tokio::test]
async fn test_convert_rejects_invalid_url() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    let app = create_router(state);

    let (status, body) =
        make_request(&app, Method::POST, "/api/v1/convert", Some(json!({ "url": "not a link" }))).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_manual_run_posts_offers() -> anyhow::Result<()> {
    let notifier = Arc::new(RecordingNotifier::default());
    let offers = vec![
        sample_offer("Headset Gamer HyperX", "199.90", Some("349.90"), "https://www.kabum.com.br/produto/10", "KaBuM!"),
        sample_offer("Cabo USB", "5.00", None, "https://www.kabum.com.br/produto/11", "KaBuM!"),
    ];
    let state = create_test_app_state(plugins_with(offers, Arc::clone(&notifier)).await).await?;
    let app = create_router(state);

    let (status, body) = make_request(&app, Method::POST, "/api/v1/run", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["collected"], 2);
    assert_eq!(body["data"]["filtered"], 1);
    assert_eq!(body["data"]["posted"], 1);
    assert_eq!(notifier.titles(), vec!["Headset Gamer HyperX"]);

    let (_, stats) = make_request(&app, Method::GET, "/api/v1/stats", None).await?;
    assert_eq!(stats["data"]["posted_total"], 1);
    assert_eq!(stats["data"]["scheduler"]["completed_runs"], 1);
    Ok(())
}

#[tokio::test]
async fn test_moderation_and_scheduler_routes() -> anyhow::Result<()> {
    let state = create_test_app_state(PluginManager::new()).await?;
    let app = create_router(state);

    let (status, body) = make_request(&app, Method::GET, "/api/v1/queue/moderation", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, body) = make_request(&app, Method::POST, "/api/v1/queue/unknown/approve", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = make_request(&app, Method::POST, "/api/v1/scheduler/pause", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Paused");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/scheduler/resume", None).await?;
    assert_eq!(body["data"]["status"], "Active");
    Ok(())
}

/// Source that takes a while to answer, so a second run can overlap it.
struct SlowSource;

#[async_trait]
impl SourcePlugin for SlowSource {
    fn name(&self) -> &'static str {
        "Slow"
    }

    fn source(&self) -> OfferSource {
        OfferSource::Promobit
    }

    async fn fetch_offers(&self, _limit: usize) -> garimpeiro_geek::Result<Vec<Offer>> {
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_overlapping_manual_run_conflicts() -> anyhow::Result<()> {
    let plugins = PluginManager::new();
    plugins.register_source(Arc::new(SlowSource)).await;
    let app = create_router(create_test_app_state(plugins).await?);

    let first = tokio::spawn({
        let app = app.clone();
        async move { make_request(&app, Method::POST, "/api/v1/run", None).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let (status, body) = make_request(&app, Method::POST, "/api/v1/run", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (first_status, _) = first.await??;
    assert_eq!(first_status, StatusCode::OK);

    let (_, stats) = make_request(&app, Method::GET, "/api/v1/stats", None).await?;
    assert_eq!(stats["data"]["scheduler"]["skipped_runs"], 1);
    Ok(())
}

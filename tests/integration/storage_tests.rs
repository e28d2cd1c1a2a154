use super::*;
use garimpeiro_geek::config::DatabaseConfig;
use garimpeiro_geek::models::Setting;
use tokio_test::assert_ok;

fn file_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}/dados/ofertas.db?mode=rwc", dir.path().display()),
        max_connections: 2,
        min_connections: 1,
        acquire_timeout: 5,
    }
}

#[tokio::test]
async fn test_history_survives_reconnect() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = file_config(&dir);
    let offer = sample_offer(
        "Placa de Vídeo RTX 4060",
        "1899.00",
        Some("2299.00"),
        "https://www.kabum.com.br/produto/461699",
        "KaBuM!",
    );

    {
        let pool = storage::connect(&config).await?;
        assert_ok!(storage::migrate(&pool).await);
        let repository = OfferRepository::new(pool.clone());
        assert!(repository.record_posted(&offer).await?);
        pool.close().await;
    }

    assert!(dir.path().join("dados").join("ofertas.db").exists());

    let pool = storage::connect(&config).await?;
    storage::migrate(&pool).await?;
    let repository = OfferRepository::new(pool);

    assert!(repository.was_posted(&offer).await?);
    assert!(!repository.record_posted(&offer).await?);
    assert_eq!(repository.count().await?, 1);

    let recent = repository.recent(10).await?;
    assert_eq!(recent[0].title, "Placa de Vídeo RTX 4060");
    assert_eq!(recent[0].price_decimal(), Some(offer.price));
    Ok(())
}

#[tokio::test]
async fn test_same_product_is_posted_once() -> anyhow::Result<()> {
    let repository = OfferRepository::new(create_test_db().await?);

    let mut first = sample_offer("Kindle 16GB", "474.05", None, "https://www.amazon.com.br/dp/B0CP31L73X", "Amazon");
    first.product_id = Some("B0CP31L73X".to_string());
    let mut cheaper = sample_offer(
        "Kindle 16GB Preto",
        "449.00",
        None,
        "https://www.amazon.com.br/dp/B0CP31L73X?th=1",
        "Amazon",
    );
    cheaper.product_id = Some("B0CP31L73X".to_string());

    assert!(repository.record_posted(&first).await?);
    assert!(repository.was_posted(&cheaper).await?);
    assert!(!repository.record_posted(&cheaper).await?);
    Ok(())
}

#[tokio::test]
async fn test_settings_round_trip() -> anyhow::Result<()> {
    let repository = OfferRepository::new(create_test_db().await?);

    repository
        .set_setting(&Setting::new("posting_paused", "true").with_description("Pausa as postagens"))
        .await?;
    repository.set_setting(&Setting::new("posting_paused", "false")).await?;

    let setting = repository.get_setting("posting_paused").await?.expect("setting stored");
    assert_eq!(setting.value, "false");
    assert_eq!(setting.description.as_deref(), Some("Pausa as postagens"));
    assert!(repository.get_setting("missing").await?.is_none());
    Ok(())
}

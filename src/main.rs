use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;

use garimpeiro_geek::affiliate::store_name;
use garimpeiro_geek::formatter::parse_admin_command;
use garimpeiro_geek::models::NewOffer;
use garimpeiro_geek::plugins::{NotifierPlugin, PluginManager};
use garimpeiro_geek::plugins::notifiers::TelegramNotifier;
use garimpeiro_geek::scraper::WebScraper;
use garimpeiro_geek::web::{self, AppState};
use garimpeiro_geek::{logging, storage, AffiliateConverter, AppConfig, DealPipeline, DealScheduler, Offer, OfferSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Garimpa ofertas em lojas brasileiras e publica no Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the status API until ctrl-c (default)
    Run,
    /// Run the pipeline once and print the report
    Once,
    /// Fetch offers from one source and print them as JSON
    Scrape {
        source: OfferSource,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Convert product links into affiliate links
    Convert {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Post an offer by hand: <link> <price> <title...>
    Post {
        link: String,
        price: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Check the Telegram bot token with getMe
    CheckTelegram,
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = config.metrics.port, "Metrics exporter listening");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => once(config).await,
        Command::Scrape { source, limit } => scrape(config, source, limit).await,
        Command::Convert { urls } => convert(config, urls).await,
        Command::Post { link, price, title } => post(config, link, price, title).await,
        Command::CheckTelegram => check_telegram(config).await,
        Command::ShowConfig => {
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn build_pipeline(config: &AppConfig) -> Result<Arc<DealPipeline>> {
    let pool = storage::connect(&config.database).await?;
    storage::migrate(&pool).await?;
    Ok(Arc::new(DealPipeline::from_config(config, pool).await?))
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Garimpeiro Geek...");
    let pipeline = build_pipeline(&config).await?;
    let scheduler = Arc::new(DealScheduler::new(Arc::clone(&pipeline), config.scheduler.clone()).await?);
    scheduler.start().await?;

    if config.server.enabled {
        let state = AppState::new(pipeline, Arc::clone(&scheduler), config.clone());
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        };
        web::serve(state, &config.server, shutdown).await?;
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down...");
    scheduler.shutdown().await?;
    Ok(())
}

async fn once(config: AppConfig) -> Result<()> {
    let pipeline = build_pipeline(&config).await?;
    let report = pipeline.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn scrape(mut config: AppConfig, source: OfferSource, limit: usize) -> Result<()> {
    config.scraper.enabled_sources = vec![source.as_str().to_string()];
    let scraper = WebScraper::new(config.scraper.clone())?;
    let plugins = PluginManager::from_config(&config, scraper).await?;

    let plugin = plugins
        .source(source.as_str())
        .await
        .with_context(|| format!("Source '{source}' is not available with the current configuration"))?;
    let offers = plugin.fetch_offers(limit).await?;
    info!(source = %source, count = offers.len(), "Fetched offers");
    println!("{}", serde_json::to_string_pretty(&offers)?);
    Ok(())
}

async fn convert(config: AppConfig, urls: Vec<String>) -> Result<()> {
    let scraper = WebScraper::new(config.scraper.clone())?;
    let converter = AffiliateConverter::new(&config.affiliate).with_scraper(scraper);

    for url in urls {
        let conversion = converter.convert_detailed(&url).await;
        println!("{}", serde_json::to_string_pretty(&conversion)?);
    }
    Ok(())
}

async fn post(config: AppConfig, link: String, price: String, title: Vec<String>) -> Result<()> {
    let command = parse_admin_command(&format!("/oferta {} {} {}", link, price, title.join(" ")))?;
    let pipeline = build_pipeline(&config).await?;
    if pipeline.plugins().list_notifier_types().await.is_empty() {
        bail!("No notifier configured; set telegram.bot_token and telegram.chat_id");
    }

    let offer = Offer::new(NewOffer {
        title: command.title,
        price: command.price,
        store: store_name(&command.link).to_string(),
        url: command.link,
        source: OfferSource::Manual,
        ..Default::default()
    });
    let result = pipeline.post_manual(offer).await?;
    info!(message_id = ?result.message_id, "Offer posted");
    Ok(())
}

async fn check_telegram(config: AppConfig) -> Result<()> {
    if config.telegram.bot_token.is_empty() {
        bail!("telegram.bot_token is not set");
    }
    let notifier = TelegramNotifier::new(config.telegram)?;
    if notifier.test_connection().await? {
        println!("Telegram OK: @{}", notifier.bot_username().await?);
        Ok(())
    } else {
        bail!("Telegram rejected the bot token")
    }
}

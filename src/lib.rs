pub mod affiliate;
pub mod config;
pub mod dedup;
pub mod filters;
pub mod formatter;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod plugins;
pub mod price;
pub mod queue;
pub mod rate_limit;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use affiliate::AffiliateConverter;
pub use config::AppConfig;
pub use models::{Offer, OfferSource};
pub use pipeline::{DealPipeline, RunReport};
pub use scheduler::DealScheduler;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;

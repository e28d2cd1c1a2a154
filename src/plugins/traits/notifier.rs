use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Offer;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<i64>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NotificationResult {
    pub fn sent(message_id: Option<i64>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
            sent_at: Utc::now(),
        }
    }
}

/// Trait for publishing offers to a channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn plugin_type(&self) -> &'static str;

    /// Core functionality
    async fn notify(&self, offer: &Offer) -> Result<NotificationResult>;
    async fn send_text(&self, text: &str) -> Result<NotificationResult>;
    async fn test_connection(&self) -> Result<bool>;
}

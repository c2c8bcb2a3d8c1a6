use log::{info, warn};

use crate::config::NotifyConfig;

/// Operator notification channel. Used for conditions where human action may
/// help: fee ceiling hit, liquidity shortfall, drain exhaustion.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> anyhow::Result<()>;
}

/// Telegram bot notifier.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &NotifyConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            warn!("Notify: telegram returned HTTP {}", resp.status());
            anyhow::bail!("telegram sendMessage failed: HTTP {}", resp.status());
        }
        Ok(())
    }
}

/// Fallback notifier used when no transport is configured: messages only go
/// to the log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        info!("Notify: {}", text);
        Ok(())
    }
}

/// Build the notifier selected by config.
pub fn from_config(config: &NotifyConfig) -> anyhow::Result<Box<dyn Notifier>> {
    if config.telegram_bot_token.is_empty() {
        Ok(Box::new(LogNotifier))
    } else {
        Ok(Box::new(TelegramNotifier::new(config)?))
    }
}

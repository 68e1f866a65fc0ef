//! Telegram Bot API alerter

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::core::{
    Alerter, Error, Result,
    config::{AlertsConfig, TelegramConfig},
};

const TELEGRAM_API: &str = "https://api.telegram.org";
const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Sends alerts to a fixed set of Telegram chats.
pub struct TelegramAlerter {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_ids: Vec<i64>,
}

impl TelegramAlerter {
    pub fn new(bot_token: impl Into<String>, chat_ids: Vec<i64>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_ids,
        }
    }

    /// Point at a different Bot API host (self-hosted server, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// `None` when Telegram alerts are not configured or disabled.
    pub fn from_config(config: &AlertsConfig) -> Result<Option<Self>> {
        match &config.telegram {
            Some(telegram) => Self::resolve(telegram, std::env::var(TOKEN_ENV).ok()),
            None => Ok(None),
        }
    }

    fn resolve(config: &TelegramConfig, env_token: Option<String>) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or(env_token)
            .ok_or_else(|| Error::Config(format!("telegram alerts enabled but no bot_token or {TOKEN_ENV} set")))?;

        if config.chat_ids.is_empty() {
            return Err(Error::Config("telegram alerts enabled but chat_ids is empty".into()));
        }

        info!(chats = config.chat_ids.len(), "Telegram alerts enabled");
        Ok(Some(Self::new(token, config.chat_ids.clone())))
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    pub fn chat_ids(&self) -> &[i64] {
        &self.chat_ids
    }
}

fn render(subject: &str, body: &str) -> String {
    format!("🚨 {subject}\n\n{body}")
}

#[async_trait]
impl Alerter for TelegramAlerter {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()> {
        let text = render(subject, body);
        let url = self.send_message_url();
        let mut failed = 0;

        for chat_id in &self.chat_ids {
            let resp = self
                .client
                .post(&url)
                .json(&json!({ "chat_id": chat_id, "text": text }))
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                warn!(chat_id, %status, %detail, "Telegram rejected alert");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(Error::Alert(format!(
                "telegram rejected alert for {failed} of {} chats",
                self.chat_ids.len()
            )));
        }
        Ok(())
    }
}

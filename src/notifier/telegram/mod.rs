pub mod command_handler;
pub mod listener;
pub mod sender;

use crate::config::TelegramConfig;
use crate::model::{CycleResult, NotifyError};
use crate::scheduler::{CycleObserver, Scheduler};
use crate::storage::SqliteStorage;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::time::Instant;
use tokio::sync::Mutex;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    pub bot_token: String,
    pub chat_id: i64,
    pub client: Client,
    pub offset: Arc<AtomicI64>,
    pub storage: Option<Arc<Mutex<SqliteStorage>>>,
    pub start_time: Instant,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(
        config: &TelegramConfig,
        storage: Option<Arc<Mutex<SqliteStorage>>>,
    ) -> Result<Self, NotifyError> {
        Self::with_api_base(config, storage, TELEGRAM_API)
    }

    pub fn with_api_base(
        config: &TelegramConfig,
        storage: Option<Arc<Mutex<SqliteStorage>>>,
        api_base: &str,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::ApiError(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id,
            client,
            offset: Arc::new(AtomicI64::new(0)),
            storage,
            start_time: Instant::now(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    pub async fn notify_text(&self, text: &str) -> Result<(), NotifyError> {
        sender::send_text(self, text).await
    }

    pub async fn notify_cycle(&self, result: &CycleResult) -> Result<(), NotifyError> {
        sender::send_cycle_summary(self, result).await
    }

    pub async fn listen_for_commands(&self, scheduler: Arc<Scheduler>) {
        listener::listen_for_commands(self, &scheduler).await;
    }

    pub async fn set_my_commands(&self) -> Result<(), NotifyError> {
        let commands = serde_json::json!({
            "commands": [
                { "command": "ping", "description": "Check connection" },
                { "command": "status", "description": "Scheduler state and last cycle" },
                { "command": "link", "description": "Optimal link for a product: /link <nm>" },
                { "command": "history", "description": "Recent cycles" },
                { "command": "refresh", "description": "Start a cycle now" },
                { "command": "uptime", "description": "Service uptime" },
                { "command": "help", "description": "Command list" }
            ]
        });
        self.client
            .post(self.method_url("setMyCommands"))
            .json(&commands)
            .send()
            .await
            .map_err(|e| NotifyError::ApiError(e.to_string()))?;
        Ok(())
    }

    pub fn spawn_listener(notifier: Arc<TelegramNotifier>, scheduler: Arc<Scheduler>) {
        tokio::spawn(async move {
            tracing::info!("▶️ Starting Telegram listener...");
            notifier.listen_for_commands(scheduler).await;
            tracing::info!("🛑 Telegram listener ended.");
        });
    }
}

#[async_trait::async_trait]
impl CycleObserver for TelegramNotifier {
    async fn cycle_completed(&self, result: &CycleResult) {
        if let Err(e) = self.notify_cycle(result).await {
            tracing::warn!("Cycle summary notification failed: {:?}", e);
        }
    }

    async fn malformed_alert(&self, ratio: f64, threshold: f64) {
        let text = format!(
            "⚠️ {:.0}% of card responses were malformed (threshold {:.0}%). The API schema may have changed.",
            ratio * 100.0,
            threshold * 100.0
        );
        if let Err(e) = self.notify_text(&text).await {
            tracing::warn!("Malformed alert notification failed: {:?}", e);
        }
    }
}

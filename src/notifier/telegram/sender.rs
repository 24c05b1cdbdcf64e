// notifier/telegram/sender.rs

use crate::model::{CycleResult, NotifyError};
use crate::notifier::telegram::TelegramNotifier;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Sends a simple text message via Telegram.
pub async fn send_text(notifier: &TelegramNotifier, text: &str) -> Result<(), NotifyError> {
    let url = notifier.method_url("sendMessage");
    let params = [
        ("chat_id", notifier.chat_id.to_string()),
        ("text", text.to_string()),
    ];
    let response = match timeout(
        Duration::from_secs(10),
        notifier.client.post(&url).form(&params).send(),
    )
    .await
    {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!("❌ Telegram send() failed: {:?}", e);
            return Err(NotifyError::ApiError(format!("Send failed: {}", e)));
        }
        Err(_) => {
            warn!("⏳ Telegram send() timed out");
            return Err(NotifyError::Unreachable);
        }
    };
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "unknown".into());
    if !status.is_success() {
        warn!("❌ Telegram API responded [{}]: {}", status, body);
        return Err(NotifyError::ApiError(format!("HTTP {}", status.as_u16())));
    }
    info!("✅ Telegram text sent [{}]", status);
    Ok(())
}

pub fn format_cycle_summary(result: &CycleResult) -> String {
    let mut message = format!(
        "📊 Cycle finished\n\n🏷 SPP: {}\n📍 dest: {}\n🧪 Samples: {} ({:.0}% ok)\n⏱ {} → {}",
        result.best_spp,
        result.best_dest,
        result.sample_count,
        result.success_rate * 100.0,
        result.cycle_start.format("%Y-%m-%d %H:%M:%S"),
        result.cycle_end.format("%H:%M:%S"),
    );
    if let Some(stats) = result.price_stats {
        message.push_str(&format!(
            "\n💰 Avg price: {:.2} ₽ (σ {:.2})\n🔻 Avg discount: {:.2}%",
            stats.avg_price / 100.0,
            stats.std_dev / 100.0,
            stats.avg_discount_pct
        ));
    }
    message
}

/// Sends the summary of a completed cycle.
pub async fn send_cycle_summary(notifier: &TelegramNotifier, result: &CycleResult) -> Result<(), NotifyError> {
    let message = format_cycle_summary(result);
    info!("📤 Sending cycle summary:\n{}", message);
    send_text(notifier, &message).await
}

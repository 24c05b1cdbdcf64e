// notifier/telegram/command_handler.rs

use crate::model::{LinkError, ProductId, SchedulerState};
use crate::notifier::telegram::TelegramNotifier;
use crate::scheduler::Scheduler;
use crate::storage::SqliteStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const HELP: &str = "📋 Available commands:\n\
    /ping — check connection\n\
    /status — scheduler state and last cycle\n\
    /link <nm> — optimal link for a product\n\
    /history — recent cycles\n\
    /refresh — start a cycle now\n\
    /uptime — service uptime\n\
    /help — command list";

/// Handles an incoming command and replies in the chat.
pub async fn handle_command(command_text: &str, notifier: &TelegramNotifier, scheduler: &Arc<Scheduler>) {
    info!("Handling command: {}", command_text);
    let reply = build_reply(
        command_text,
        scheduler,
        notifier.storage.as_ref(),
        notifier.start_time.elapsed(),
    )
    .await;
    if let Err(e) = notifier.notify_text(&reply).await {
        warn!("{} reply error: {:?}", command_text, e);
    }
}

/// Computes the reply text for a command.
pub async fn build_reply(
    command_text: &str,
    scheduler: &Arc<Scheduler>,
    storage: Option<&Arc<Mutex<SqliteStorage>>>,
    uptime: Duration,
) -> String {
    let mut parts = command_text.split_whitespace();
    // Commands may arrive as "/link@SomeBot" in group chats.
    let command = parts
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();

    match command {
        "/ping" => "✅ I am online!".to_string(),
        "/help" => HELP.to_string(),
        "/status" => status_reply(scheduler),
        "/link" => match parts.next().map(str::parse::<ProductId>) {
            Some(Ok(product_id)) => match scheduler.current_link(product_id) {
                Ok(url) => format!("🔗 {}", url),
                Err(LinkError::NoDataAvailable) => {
                    "📭 No completed cycle yet, a link cannot be built.".to_string()
                }
            },
            Some(Err(_)) => "❌ Product id must be a number: /link <nm>".to_string(),
            None => "Usage: /link <nm>".to_string(),
        },
        "/refresh" => {
            if scheduler.state() == SchedulerState::Running {
                "⏳ A cycle is already running.".to_string()
            } else {
                // The run loop starts the cycle and restarts its timer.
                scheduler.request_refresh();
                "🔄 Refresh requested, a new cycle starts shortly.".to_string()
            }
        }
        "/history" => history_reply(storage).await,
        "/uptime" => {
            let secs = uptime.as_secs();
            format!(
                "⏱ Uptime: {:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        _ => "🤖 Unknown command. Type /help for a list of commands.".to_string(),
    }
}

fn status_reply(scheduler: &Scheduler) -> String {
    let status = scheduler.cycle_status();
    let state = match status.state {
        SchedulerState::Idle => "💤 Idle",
        SchedulerState::Running => "🏃 Running",
    };
    let Some(result) = status.last_result else {
        return format!("{}\nNo completed cycle yet.", state);
    };
    let mut msg = format!(
        "{}\nLast cycle: {}\nSPP: {} | dest: {}\nSamples: {} ({:.0}% ok)",
        state,
        result.cycle_end.format("%Y-%m-%d %H:%M:%S"),
        result.best_spp,
        result.best_dest,
        result.sample_count,
        result.success_rate * 100.0
    );
    if let Some(stats) = result.price_stats {
        msg.push_str(&format!("\nAvg discount: {:.2}%", stats.avg_discount_pct));
    }
    msg
}

async fn history_reply(storage: Option<&Arc<Mutex<SqliteStorage>>>) -> String {
    let Some(storage) = storage else {
        return "📭 History is not available.".to_string();
    };
    match storage.lock().await.recent_cycles(5) {
        Ok(cycles) if !cycles.is_empty() => {
            let mut msg = String::from("🗂 Recent cycles:\n");
            for (i, c) in cycles.iter().enumerate() {
                msg.push_str(&format!(
                    "{}. {} — spp {} / dest {} ({} samples)\n",
                    i + 1,
                    c.cycle_end.format("%Y-%m-%d %H:%M"),
                    c.best_spp,
                    c.best_dest,
                    c.sample_count
                ));
            }
            msg
        }
        Ok(_) => "📭 No cycles in the database.".to_string(),
        Err(e) => format!("❌ Error: {:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::model::{CycleResult, Dest, FetchError, PriceQuote, PriceStats, Spp};
    use crate::scraper::MarketplaceClient;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct AlwaysOk {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MarketplaceClient for AlwaysOk {
        async fn fetch(&self, _p: ProductId, _s: Spp, _d: Dest) -> Result<PriceQuote, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PriceQuote {
                basic: 100,
                product: 90,
                qty: 1,
            })
        }
    }

    fn scheduler_with(client: Arc<AlwaysOk>) -> Arc<Scheduler> {
        let mut cfg = AppConfig::with_candidates(vec![15], vec![-1257786], vec![1]);
        cfg.min_dest_delay_ms = 0;
        Arc::new(Scheduler::new(Arc::new(cfg), client).with_interval(Duration::from_secs(3600)))
    }

    fn scheduler() -> Arc<Scheduler> {
        scheduler_with(Arc::new(AlwaysOk::default()))
    }

    fn cycle() -> CycleResult {
        CycleResult {
            cycle_start: Utc::now(),
            cycle_end: Utc::now(),
            best_spp: 15,
            best_dest: -1257786,
            sample_count: 3,
            success_rate: 1.0,
            outcome_counts: Default::default(),
            price_stats: Some(PriceStats {
                avg_price: 90_000.0,
                std_dev: 0.0,
                avg_discount_pct: 10.0,
            }),
        }
    }

    async fn reply(text: &str, scheduler: &Arc<Scheduler>) -> String {
        build_reply(text, scheduler, None, Duration::from_secs(3725)).await
    }

    #[tokio::test]
    async fn link_before_and_after_first_cycle() {
        let s = scheduler();
        assert!(reply("/link 12345", &s).await.contains("No completed cycle"));
        s.restore(cycle());
        let text = reply("/link@SppBot 12345", &s).await;
        assert!(text.contains("spp=15"));
        assert!(text.contains("nm=12345"));
    }

    #[tokio::test]
    async fn link_argument_is_validated() {
        let s = scheduler();
        assert!(reply("/link", &s).await.starts_with("Usage"));
        assert!(reply("/link abc", &s).await.contains("must be a number"));
    }

    #[tokio::test]
    async fn status_reports_state_and_last_cycle() {
        let s = scheduler();
        assert!(reply("/status", &s).await.contains("No completed cycle yet"));
        s.restore(cycle());
        let text = reply("/status", &s).await;
        assert!(text.contains("Idle"));
        assert!(text.contains("SPP: 15 | dest: -1257786"));
        assert!(text.contains("Avg discount: 10.00%"));
    }

    #[tokio::test]
    async fn uptime_and_unknown_commands() {
        let s = scheduler();
        assert_eq!(reply("/uptime", &s).await, "⏱ Uptime: 01:02:05");
        assert!(reply("/bogus", &s).await.contains("Unknown command"));
    }

    #[tokio::test]
    async fn history_reads_storage() {
        let s = scheduler();
        assert!(reply("/history", &s).await.contains("not available"));

        let storage = Arc::new(Mutex::new(SqliteStorage::in_memory().unwrap()));
        storage.lock().await.save_cycle(&cycle()).unwrap();
        let text = build_reply("/history", &s, Some(&storage), Duration::ZERO).await;
        assert!(text.contains("spp 15 / dest -1257786 (3 samples)"));
    }

    async fn wait_for_calls(client: &AlwaysOk, n: usize) {
        for _ in 0..500 {
            if client.calls.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} fetches");
    }

    #[tokio::test]
    async fn refresh_wakes_the_run_loop() {
        let client = Arc::new(AlwaysOk::default());
        let s = scheduler_with(client.clone());
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(s.clone().run(shutdown.clone()));

        // Startup cycle, then the loop sleeps for an hour.
        wait_for_calls(&client, 1).await;
        while s.state() == SchedulerState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(reply("/refresh", &s).await.starts_with("🔄 Refresh requested"));
        wait_for_calls(&client, 2).await;

        shutdown.notify_one();
        handle.await.unwrap();
    }
}

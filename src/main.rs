use spp_sniper::config::{AppConfig, load_config};
use spp_sniper::notifier::TelegramNotifier;
use spp_sniper::scheduler::Scheduler;
use spp_sniper::scraper::WbClient;
use spp_sniper::storage::SqliteStorage;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    // Load configuration from file
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config: Arc<AppConfig> = match load_config(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return;
        }
    };
    if let Err(e) = config.validate() {
        // Cycles re-validate and abort on their own; keep serving stored results.
        warn!("Configuration is invalid, cycles will be skipped: {}", e);
    }
    info!(
        "Sampling {} products × {} spp × {} dest values",
        config.products.len(),
        config.candidate_spp.len(),
        config.candidate_dest.len()
    );

    let client = match WbClient::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build marketplace client: {}", e);
            return;
        }
    };

    // Initialize storage (SQLite) with async access (wrapped in a Mutex)
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let scheduler = Arc::new(Scheduler::new(config.clone(), Arc::new(client)));

    // Stale-but-valid data is better than none until the first cycle completes.
    match storage.lock().await.latest_cycle() {
        Ok(Some(previous)) => scheduler.restore(previous),
        Ok(None) => info!("No stored cycle, links unavailable until the first cycle completes."),
        Err(e) => warn!("Failed to load previous cycle: {:?}", e),
    }
    scheduler.add_observer(storage.clone());

    if let Some(tg_config) = &config.telegram {
        match TelegramNotifier::new(tg_config, Some(storage.clone())) {
            Ok(notifier) => {
                let notifier = Arc::new(notifier);
                if let Err(e) = notifier.set_my_commands().await {
                    warn!("setMyCommands failed: {:?}", e);
                }
                info!("Sending startup message...");
                if let Err(e) = notifier.notify_text("🚀 SppSniper started!").await {
                    warn!("Startup notification failed: {:?}", e);
                }
                scheduler.add_observer(notifier.clone());
                TelegramNotifier::spawn_listener(notifier, scheduler.clone());
            }
            Err(e) => warn!("Telegram disabled: {:?}", e),
        }
    }

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received.");
                    shutdown.notify_one();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }

    scheduler.run(shutdown).await;
    info!("👋 SppSniper stopped.");
}

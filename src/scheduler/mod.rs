//! Cycle scheduler.
//!
//! Owns the `Idle -> Running -> Idle` state machine, runs one collection
//! cycle at a time, and publishes each completed [`CycleResult`] with a
//! single reference swap.

pub mod observer;

use crate::analyzer::Aggregator;
use crate::collector::{CollectionPlan, SampleCollector};
use crate::config::AppConfig;
use crate::link::LinkBuilder;
use crate::model::{CycleError, CycleResult, CycleStatus, LinkError, ProductId, SchedulerState};
use crate::scraper::MarketplaceClient;
use chrono::Utc;
pub use observer::CycleObserver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a> {
    running: &'a AtomicBool,
    cancel: &'a Mutex<Option<Arc<AtomicBool>>>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    config: Arc<AppConfig>,
    collector: SampleCollector,
    link_builder: LinkBuilder,
    interval: Duration,
    running: AtomicBool,
    current_cancel: Mutex<Option<Arc<AtomicBool>>>,
    latest: RwLock<Option<Arc<CycleResult>>>,
    observers: RwLock<Vec<Arc<dyn CycleObserver>>>,
    refresh: Notify,
}

impl Scheduler {
    pub fn new(config: Arc<AppConfig>, client: Arc<dyn MarketplaceClient>) -> Self {
        let collector = SampleCollector::from_config(client, &config);
        let link_builder = LinkBuilder::new(&config.link_base_url);
        let interval = config.cycle_interval();
        Self {
            config,
            collector,
            link_builder,
            interval,
            running: AtomicBool::new(false),
            current_cancel: Mutex::new(None),
            latest: RwLock::new(None),
            observers: RwLock::new(Vec::new()),
            refresh: Notify::new(),
        }
    }

    /// Overrides the interval between timer-driven cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn CycleObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Seeds the latest result, e.g. from durable storage at startup.
    pub fn restore(&self, result: CycleResult) {
        info!(
            "♻️ Restored cycle from {} (spp={}, dest={})",
            result.cycle_end, result.best_spp, result.best_dest
        );
        self.publish(Arc::new(result));
    }

    pub fn latest(&self) -> Option<Arc<CycleResult>> {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn cycle_status(&self) -> CycleStatus {
        CycleStatus {
            state: self.state(),
            last_result: self.latest(),
        }
    }

    /// Optimal link for `product_id` built from the most recent completed cycle.
    pub fn current_link(&self, product_id: ProductId) -> Result<String, LinkError> {
        let latest = self.latest();
        self.link_builder.build(product_id, latest.as_deref())
    }

    /// Asks the periodic loop to start a cycle without waiting for the timer.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Stops the in-flight cycle from starting new requests. Its partial
    /// result is discarded.
    pub fn cancel_current(&self) {
        if let Some(flag) = self
            .current_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            info!("🛑 Cancelling running cycle");
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Idle -> Running. Returns the cancel flag of the new cycle, or `None`
    /// when a cycle is already in flight.
    fn try_begin(&self) -> Option<Arc<AtomicBool>> {
        // Held across the state change so `cancel_current` never sees
        // Running without the flag of that cycle.
        let mut current = self
            .current_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        *current = Some(flag.clone());
        Some(flag)
    }

    /// Starts a cycle in the background. A trigger while a cycle is running
    /// is logged and dropped.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Some(cancel) = self.try_begin() else {
            info!("⏭️ Cycle already running, trigger ignored");
            return TriggerOutcome::AlreadyRunning;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Errors are logged inside; the previous result stays published.
            let _ = this.execute(cancel).await;
        });
        TriggerOutcome::Started
    }

    /// Runs a cycle to completion on the current task.
    pub async fn run_cycle_now(&self) -> Result<Arc<CycleResult>, CycleError> {
        let Some(cancel) = self.try_begin() else {
            info!("⏭️ Cycle already running, manual run ignored");
            return Err(CycleError::AlreadyRunning);
        };
        self.execute(cancel).await
    }

    async fn execute(&self, cancel: Arc<AtomicBool>) -> Result<Arc<CycleResult>, CycleError> {
        let _guard = RunningGuard {
            running: &self.running,
            cancel: &self.current_cancel,
        };

        match self.run_cycle(&cancel).await {
            Ok(result) => {
                info!(
                    "🏁 Cycle complete: spp={} dest={} samples={} success_rate={:.2}",
                    result.best_spp, result.best_dest, result.sample_count, result.success_rate
                );
                Ok(result)
            }
            Err(e) => {
                if self.latest().is_some() {
                    warn!("❌ Cycle aborted: {}. Keeping previous result.", e);
                } else {
                    error!("❌ Cycle aborted: {}. No result available yet.", e);
                }
                Err(e)
            }
        }
    }

    async fn run_cycle(&self, cancel: &AtomicBool) -> Result<Arc<CycleResult>, CycleError> {
        let cycle_start = Utc::now();
        info!("🚀 Starting collection cycle");

        self.config.validate()?;
        let plan = CollectionPlan::from_config(&self.config);

        // Fresh tables every cycle; nothing carries over from the last one.
        let aggregator = Aggregator::new();
        let report = self.collector.collect(&plan, &aggregator, cancel).await;
        if report.cancelled {
            return Err(CycleError::Cancelled);
        }

        let malformed_ratio = aggregator.malformed_ratio();
        let threshold = self.config.malformed_alert_ratio;
        if malformed_ratio > threshold {
            warn!(
                malformed_ratio,
                threshold, "⚠️ Malformed response rate above threshold, card schema may have changed"
            );
            for observer in self.observers_snapshot() {
                observer.malformed_alert(malformed_ratio, threshold).await;
            }
        }

        let result = Arc::new(aggregator.snapshot(cycle_start, Utc::now())?);
        self.publish(result.clone());

        for observer in self.observers_snapshot() {
            observer.cycle_completed(&result).await;
        }
        Ok(result)
    }

    fn publish(&self, result: Arc<CycleResult>) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }

    fn observers_snapshot(&self) -> Vec<Arc<dyn CycleObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Periodic loop: one cycle immediately, then one per interval or manual
    /// refresh, until `shutdown` is notified.
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        info!("⏱ Scheduler started, interval {}s", self.interval.as_secs());
        loop {
            self.trigger();

            info!(
                "Waiting for timer ({}s) or manual refresh...",
                self.interval.as_secs()
            );
            tokio::select! {
                _ = sleep(self.interval) => {
                    info!("Timer triggered.");
                }
                _ = self.refresh.notified() => {
                    info!("Manual refresh triggered.");
                }
                _ = shutdown.notified() => {
                    info!("Shutdown requested, stopping scheduler.");
                    self.cancel_current();
                    break;
                }
            }
        }
    }
}

use crate::model::CycleResult;

/// Receives completed cycles and health signals from the scheduler.
#[async_trait::async_trait]
pub trait CycleObserver: Send + Sync {
    async fn cycle_completed(&self, result: &CycleResult);

    /// Called when the share of malformed responses in a finished cycle
    /// exceeds the configured threshold.
    async fn malformed_alert(&self, _ratio: f64, _threshold: f64) {}
}

// Sample collector: drives one request chain per (product, spp, dest) combination.

pub mod pacing;
pub mod retry;

use crate::analyzer::Aggregator;
use crate::config::AppConfig;
use crate::model::{Dest, Outcome, ProductId, Sample, Spp};
use crate::scraper::MarketplaceClient;
use futures::future;
use futures::stream::{self, StreamExt};
use pacing::DestPacer;
use retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The sampling universe of one cycle.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub products: Vec<ProductId>,
    pub spp: Vec<Spp>,
    pub dest: Vec<Dest>,
}

impl CollectionPlan {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            products: config.products.clone(),
            spp: config.candidate_spp.clone(),
            dest: config.candidate_dest.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len() * self.spp.len() * self.dest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination once. Dest varies fastest so consecutive requests
    /// rotate through regions instead of queueing behind one pacer slot.
    pub fn combinations(&self) -> impl Iterator<Item = (ProductId, Spp, Dest)> + '_ {
        self.products.iter().flat_map(move |&product| {
            self.spp
                .iter()
                .flat_map(move |&spp| self.dest.iter().map(move |&dest| (product, spp, dest)))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionReport {
    pub planned: usize,
    pub attempted: usize,
    pub cancelled: bool,
}

pub struct SampleCollector {
    client: Arc<dyn MarketplaceClient>,
    concurrency: usize,
    retry: RetryPolicy,
    pacer: DestPacer,
}

impl SampleCollector {
    pub fn new(
        client: Arc<dyn MarketplaceClient>,
        concurrency: usize,
        retry: RetryPolicy,
        min_dest_delay: Duration,
    ) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            retry,
            pacer: DestPacer::new(min_dest_delay),
        }
    }

    pub fn from_config(client: Arc<dyn MarketplaceClient>, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.concurrency,
            RetryPolicy {
                max_retries: config.max_retries,
                backoff_base_ms: config.backoff_base_ms,
            },
            config.min_dest_delay(),
        )
    }

    /// Attempts every combination of `plan` once, feeding each finished sample
    /// to `aggregator` as it completes.
    ///
    /// When `cancel` is set no further request is sent: queued combinations
    /// are dropped, chains waiting on pacing or back-off stop without a
    /// sample, and only requests already on the wire run to completion.
    pub async fn collect(&self, plan: &CollectionPlan, aggregator: &Aggregator, cancel: &AtomicBool) -> CollectionReport {
        let planned = plan.len();
        let attempted = AtomicUsize::new(0);
        info!(
            planned,
            concurrency = self.concurrency,
            "📡 Collecting samples"
        );

        stream::iter(plan.combinations())
            .take_while(|_| future::ready(!cancel.load(Ordering::SeqCst)))
            .map(|(product_id, spp, dest)| {
                let attempted = &attempted;
                async move {
                    attempted.fetch_add(1, Ordering::SeqCst);
                    if let Some(sample) = self.sample_one(product_id, spp, dest, cancel).await {
                        aggregator.record(&sample);
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .for_each(|()| future::ready(()))
            .await;

        let report = CollectionReport {
            planned,
            attempted: attempted.load(Ordering::SeqCst),
            cancelled: cancel.load(Ordering::SeqCst),
        };
        if report.cancelled {
            warn!(
                attempted = report.attempted,
                planned, "🛑 Collection cancelled before all combinations were attempted"
            );
        } else {
            info!(attempted = report.attempted, "✅ Collection finished");
        }
        report
    }

    /// Fetches one combination with retries and returns its final sample,
    /// or `None` if `cancel` was set before the chain finished.
    pub async fn sample_one(&self, product_id: ProductId, spp: Spp, dest: Dest, cancel: &AtomicBool) -> Option<Sample> {
        let outcome = retry_with_backoff(self.retry, || async move {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            self.pacer.wait_turn(dest).await;
            // Pacing can take seconds; re-check before hitting the network.
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            Some(self.client.fetch(product_id, spp, dest).await)
        })
        .await;

        let Some((result, attempts)) = outcome else {
            debug!(product_id, spp, dest, "sample abandoned, cycle cancelled");
            return None;
        };

        let sample = Sample::from_fetch(product_id, spp, dest, &result);
        match (&result, sample.outcome) {
            (Ok(quote), _) => debug!(
                product_id,
                spp,
                dest,
                attempts,
                price = quote.product,
                "sample ok"
            ),
            (Err(e), Outcome::Malformed) => warn!(product_id, spp, dest, error = %e, "⚠️ Malformed card response"),
            (Err(e), _) => debug!(product_id, spp, dest, attempts, error = %e, "sample failed"),
        }
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FetchError, PriceQuote};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const QUOTE: PriceQuote = PriceQuote {
        basic: 1000,
        product: 700,
        qty: 3,
    };

    /// Replays a scripted list of results per spp value, then succeeds.
    struct ScriptedClient {
        scripts: Mutex<HashMap<Spp, Vec<Result<PriceQuote, FetchError>>>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedClient {
        fn new(delay: Duration) -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }

        fn script(self, spp: Spp, mut results: Vec<Result<PriceQuote, FetchError>>) -> Self {
            results.reverse();
            self.scripts.lock().unwrap().insert(spp, results);
            self
        }
    }

    #[async_trait::async_trait]
    impl MarketplaceClient for ScriptedClient {
        async fn fetch(&self, _product_id: ProductId, spp: Spp, _dest: Dest) -> Result<PriceQuote, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let next = self.scripts.lock().unwrap().get_mut(&spp).and_then(|s| s.pop());
            next.unwrap_or(Ok(QUOTE))
        }
    }

    fn collector(client: Arc<ScriptedClient>, concurrency: usize, max_retries: u32) -> SampleCollector {
        SampleCollector::new(
            client,
            concurrency,
            RetryPolicy {
                max_retries,
                backoff_base_ms: 0,
            },
            Duration::ZERO,
        )
    }

    fn plan(products: Vec<ProductId>, spp: Vec<Spp>, dest: Vec<Dest>) -> CollectionPlan {
        CollectionPlan { products, spp, dest }
    }

    #[test]
    fn plan_enumerates_every_combination_once() {
        let p = plan(vec![1, 2], vec![10, 20, 30], vec![-1, 5]);
        let combos: Vec<_> = p.combinations().collect();
        assert_eq!(combos.len(), 12);
        assert_eq!(p.len(), 12);
        let unique: std::collections::HashSet<_> = combos.iter().collect();
        assert_eq!(unique.len(), 12);
        assert_eq!(combos[0], (1, 10, -1));
        assert_eq!(combos[1], (1, 10, 5));
    }

    #[tokio::test]
    async fn transient_failures_then_success_record_one_success() {
        let client = Arc::new(ScriptedClient::new(Duration::ZERO).script(
            10,
            vec![
                Err(FetchError::Network("timeout".into())),
                Err(FetchError::Network("timeout".into())),
                Ok(QUOTE),
            ],
        ));
        let agg = Aggregator::new();
        let report = collector(client.clone(), 2, 3)
            .collect(&plan(vec![1], vec![10], vec![7]), &agg, &AtomicBool::new(false))
            .await;

        assert_eq!(report.attempted, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agg.sample_count(), 1);
        assert_eq!(agg.outcome_count(Outcome::Success), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_record_final_failure() {
        let client = Arc::new(ScriptedClient::new(Duration::ZERO).script(
            10,
            vec![
                Err(FetchError::RateLimited),
                Err(FetchError::RateLimited),
                Err(FetchError::RateLimited),
            ],
        ));
        let agg = Aggregator::new();
        collector(client.clone(), 1, 2)
            .collect(&plan(vec![1], vec![10], vec![7]), &agg, &AtomicBool::new(false))
            .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agg.sample_count(), 1);
        assert_eq!(agg.outcome_count(Outcome::RateLimited), 1);
    }

    #[tokio::test]
    async fn permanent_failures_are_recorded_without_retry() {
        let client = Arc::new(
            ScriptedClient::new(Duration::ZERO)
                .script(10, vec![Err(FetchError::NotFound)])
                .script(20, vec![Err(FetchError::Malformed("missing price".into()))]),
        );
        let agg = Aggregator::new();
        collector(client.clone(), 4, 3)
            .collect(&plan(vec![1], vec![10, 20, 30], vec![7]), &agg, &AtomicBool::new(false))
            .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(agg.outcome_count(Outcome::NotFound), 1);
        assert_eq!(agg.outcome_count(Outcome::Malformed), 1);
        assert_eq!(agg.outcome_count(Outcome::Success), 1);
    }

    #[tokio::test]
    async fn failures_do_not_skip_other_combinations() {
        let client = Arc::new(ScriptedClient::new(Duration::ZERO).script(
            10,
            (0..10).map(|_| Err(FetchError::Network("down".into()))).collect(),
        ));
        let agg = Aggregator::new();
        let report = collector(client, 3, 1)
            .collect(&plan(vec![1, 2], vec![10, 20], vec![7, 8]), &agg, &AtomicBool::new(false))
            .await;

        assert_eq!(report.planned, 8);
        assert_eq!(report.attempted, 8);
        assert!(!report.cancelled);
        assert_eq!(agg.sample_count(), 8);
        assert_eq!(agg.outcome_count(Outcome::Success), 4);
        assert_eq!(agg.outcome_count(Outcome::NetworkError), 4);
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_concurrency() {
        let client = Arc::new(ScriptedClient::new(Duration::from_millis(5)));
        let agg = Aggregator::new();
        collector(client.clone(), 3, 0)
            .collect(
                &plan(vec![1, 2, 3, 4], vec![10, 20, 30], vec![7]),
                &agg,
                &AtomicBool::new(false),
            )
            .await;

        assert_eq!(agg.sample_count(), 12);
        let max = client.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
    }

    #[tokio::test]
    async fn cancelled_collection_starts_nothing() {
        let client = Arc::new(ScriptedClient::new(Duration::ZERO));
        let agg = Aggregator::new();
        let report = collector(client.clone(), 2, 0)
            .collect(&plan(vec![1], vec![10, 20], vec![7]), &agg, &AtomicBool::new(true))
            .await;

        assert!(report.cancelled);
        assert_eq!(report.attempted, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    /// Always fails transiently and raises the cancel flag on its first call.
    struct CancellingClient {
        cancel: Arc<AtomicBool>,
        calls: AtomicUsize,
        calls_after_cancel: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MarketplaceClient for CancellingClient {
        async fn fetch(&self, _product_id: ProductId, _spp: Spp, _dest: Dest) -> Result<PriceQuote, FetchError> {
            if self.cancel.swap(true, Ordering::SeqCst) {
                self.calls_after_cancel.fetch_add(1, Ordering::SeqCst);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Network("connection reset".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_paced_and_retrying_chains() {
        let cancel = Arc::new(AtomicBool::new(false));
        let client = Arc::new(CancellingClient {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
            calls_after_cancel: AtomicUsize::new(0),
        });
        let collector = SampleCollector::new(
            client.clone(),
            4,
            RetryPolicy {
                max_retries: 3,
                backoff_base_ms: 100,
            },
            Duration::from_secs(2),
        );
        let agg = Aggregator::new();
        let report = collector
            .collect(&plan(vec![1, 2], vec![10, 20, 30], vec![7]), &agg, &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.planned, 6);
        assert!(report.attempted <= 4);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls_after_cancel.load(Ordering::SeqCst), 0);
        // Partial chains leave nothing behind in the tables.
        assert_eq!(agg.sample_count(), 0);
    }
}

use crate::analyzer::frequency::FrequencyTable;
use crate::analyzer::price_stats::calculate_stats;
use crate::model::{AnalysisError, CycleResult, Dest, Outcome, PriceQuote, Sample, Spp};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct AggregatorState {
    spp: FrequencyTable<Spp>,
    dest: FrequencyTable<Dest>,
    outcomes: BTreeMap<Outcome, u64>,
    prices: Vec<PriceQuote>,
    sample_count: u64,
}

/// Per-cycle frequency aggregation. A fresh instance is created for every
/// cycle; workers call [`Aggregator::record`] concurrently and the scheduler
/// takes one [`Aggregator::snapshot`] after the collector finishes.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the sample. Only successful samples touch the frequency tables.
    pub fn record(&self, sample: &Sample) {
        let mut state = self.lock();
        state.sample_count += 1;
        *state.outcomes.entry(sample.outcome).or_insert(0) += 1;

        if !sample.outcome.is_success() {
            return;
        }
        state.spp.increment(sample.spp);
        state.dest.increment(sample.dest);
        if let Some(price) = sample.price {
            state.prices.push(price);
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.lock().sample_count
    }

    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.lock().outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Share of recorded samples that came back malformed.
    pub fn malformed_ratio(&self) -> f64 {
        let state = self.lock();
        if state.sample_count == 0 {
            return 0.0;
        }
        let malformed = state.outcomes.get(&Outcome::Malformed).copied().unwrap_or(0);
        malformed as f64 / state.sample_count as f64
    }

    pub fn spp_table(&self) -> FrequencyTable<Spp> {
        self.lock().spp.clone()
    }

    pub fn dest_table(&self) -> FrequencyTable<Dest> {
        self.lock().dest.clone()
    }

    /// Freezes the current tables into a [`CycleResult`].
    ///
    /// Fails with [`AnalysisError::NoData`] when no sample succeeded, so that
    /// callers never publish a fabricated best value.
    pub fn snapshot(
        &self,
        cycle_start: DateTime<Utc>,
        cycle_end: DateTime<Utc>,
    ) -> Result<CycleResult, AnalysisError> {
        let state = self.lock();
        let (best_spp, _) = state.spp.mode().ok_or(AnalysisError::NoData)?;
        let (best_dest, _) = state.dest.mode().ok_or(AnalysisError::NoData)?;

        let successes = state.spp.total();
        let success_rate = successes as f64 / state.sample_count as f64;

        Ok(CycleResult {
            cycle_start,
            cycle_end,
            best_spp,
            best_dest,
            sample_count: state.sample_count,
            success_rate,
            outcome_counts: state.outcomes.clone(),
            price_stats: calculate_stats(&state.prices),
        })
    }
}

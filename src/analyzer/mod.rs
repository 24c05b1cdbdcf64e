// Analyzer module: per-cycle frequency aggregation over collected samples.

pub mod aggregator;
pub mod frequency;
pub mod price_stats;

// Re-export the aggregator for ease of use.
pub use aggregator::Aggregator;
pub use frequency::FrequencyTable;

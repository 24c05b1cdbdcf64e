//! Samples the Wildberries card API across candidate `spp`/`dest` values,
//! finds the most frequent values among successful responses, and builds
//! product links with them.

pub mod analyzer;
pub mod collector;
pub mod config;
pub mod link;
pub mod model;
pub mod notifier;
pub mod parser;
pub mod scheduler;
pub mod scraper;
pub mod storage;

pub use analyzer::Aggregator;
pub use collector::{CollectionPlan, SampleCollector};
pub use config::{AppConfig, load_config};
pub use link::LinkBuilder;
pub use model::{CycleResult, CycleStatus, LinkError, Outcome, Sample, SchedulerState};
pub use scheduler::{CycleObserver, Scheduler, TriggerOutcome};
pub use scraper::{MarketplaceClient, WbClient};

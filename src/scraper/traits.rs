use crate::model::{Dest, FetchError, PriceQuote, ProductId, Spp};

/// One request against the catalog API. Implementations classify failures
/// but never retry; retry policy lives in the collector.
#[async_trait::async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn fetch(&self, product_id: ProductId, spp: Spp, dest: Dest) -> Result<PriceQuote, FetchError>;
}

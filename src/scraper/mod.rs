// Marketplace client: HTTP access to the catalog API

pub mod fetcher;
pub mod traits;

pub use fetcher::WbClient;
pub use traits::MarketplaceClient;

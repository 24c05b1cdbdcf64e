use crate::config::AppConfig;
use crate::model::{Dest, FetchError, PriceQuote, ProductId, Spp};
use crate::parser::{CardParser, Parser};
use crate::scraper::traits::MarketplaceClient;

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Catalog query parameters shared by fetched URLs and generated links.
pub fn card_query(product_id: ProductId, spp: Spp, dest: Dest) -> String {
    format!(
        "appType=1&curr=rub&dest={}&spp={}&hide_dtype=11&ab_testing=false&lang=ru&nm={}",
        dest, spp, product_id
    )
}

pub struct WbClient {
    pub client: Client,
    base_url: String,
    parser: CardParser,
}

impl WbClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('?').to_string(),
            parser: CardParser::new(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Self::new(&config.api_base_url, config.request_timeout(), &config.user_agent)
    }

    fn build_url(&self, product_id: ProductId, spp: Spp, dest: Dest) -> String {
        format!("{}?{}", self.base_url, card_query(product_id, spp, dest))
    }
}

#[async_trait::async_trait]
impl MarketplaceClient for WbClient {
    async fn fetch(&self, product_id: ProductId, spp: Spp, dest: Dest) -> Result<PriceQuote, FetchError> {
        let url = self.build_url(product_id, spp, dest);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        // A timeout while streaming the body is still a network failure.
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(self.parser.parse(&body, product_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_all_card_parameters() {
        let client = WbClient::new("https://card.wb.ru/cards/v4/detail", Duration::from_secs(1), "test").unwrap();
        let url = client.build_url(12345, 30, -1257786);
        assert_eq!(
            url,
            "https://card.wb.ru/cards/v4/detail?appType=1&curr=rub&dest=-1257786&spp=30&hide_dtype=11&ab_testing=false&lang=ru&nm=12345"
        );
    }
}

// Optimal product link construction
use crate::model::{CycleResult, LinkError, ProductId};
use crate::scraper::fetcher::card_query;

#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base_url: String,
}

impl LinkBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('?').to_string(),
        }
    }

    /// Builds the card link for `product_id` using the best spp/dest of `latest`.
    ///
    /// Returns [`LinkError::NoDataAvailable`] until a cycle has completed; a
    /// link is never built from default values.
    pub fn build(&self, product_id: ProductId, latest: Option<&CycleResult>) -> Result<String, LinkError> {
        let result = latest.ok_or(LinkError::NoDataAvailable)?;
        Ok(format!(
            "{}?{}",
            self.base_url,
            card_query(product_id, result.best_spp, result.best_dest)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn result(spp: u32, dest: i64) -> CycleResult {
        CycleResult {
            cycle_start: Utc::now(),
            cycle_end: Utc::now(),
            best_spp: spp,
            best_dest: dest,
            sample_count: 10,
            success_rate: 1.0,
            outcome_counts: BTreeMap::new(),
            price_stats: None,
        }
    }

    #[test]
    fn no_result_means_no_link() {
        let builder = LinkBuilder::new("https://card.wb.ru/cards/v4/detail");
        assert_eq!(builder.build(12345, None), Err(LinkError::NoDataAvailable));
    }

    #[test]
    fn link_embeds_best_values() {
        let builder = LinkBuilder::new("https://card.wb.ru/cards/v4/detail");
        let url = builder.build(12345, Some(&result(20, -1257786))).unwrap();
        assert_eq!(
            url,
            "https://card.wb.ru/cards/v4/detail?appType=1&curr=rub&dest=-1257786&spp=20&hide_dtype=11&ab_testing=false&lang=ru&nm=12345"
        );
    }

    #[test]
    fn trailing_question_mark_in_base_is_tolerated() {
        let builder = LinkBuilder::new("https://example.test/detail?");
        let url = builder.build(1, Some(&result(5, 6))).unwrap();
        assert!(url.starts_with("https://example.test/detail?appType=1"));
        assert!(url.contains("&spp=5&"));
        assert!(url.contains("dest=6&"));
        assert!(url.ends_with("nm=1"));
    }
}

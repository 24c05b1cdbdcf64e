use crate::model::{PriceQuote, PriceStats};

/// Average and population standard deviation of the positive selling prices,
/// plus the mean discount of those quotes.
/// Returns `None` when there is nothing to average.
pub fn calculate_stats(quotes: &[PriceQuote]) -> Option<PriceStats> {
    let priced: Vec<&PriceQuote> = quotes.iter().filter(|q| q.product > 0).collect();
    if priced.is_empty() {
        return None;
    }

    let count = priced.len() as f64;
    let avg = priced.iter().map(|q| q.product as f64).sum::<f64>() / count;
    let std_dev = (priced
        .iter()
        .map(|q| (q.product as f64 - avg).powi(2))
        .sum::<f64>()
        / count)
        .sqrt();
    let discount = priced.iter().map(|q| q.discount_pct()).sum::<f64>() / count;

    Some(PriceStats {
        avg_price: avg,
        std_dev,
        avg_discount_pct: (discount * 100.0).round() / 100.0,
    })
}

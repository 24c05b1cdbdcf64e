// Wildberries card API (cards/v4/detail) JSON parsing
use crate::model::{ParserError, PriceQuote, ProductId};
use serde::Deserialize;

pub trait Parser {
    fn parse(&self, body: &[u8], product_id: ProductId) -> Result<PriceQuote, ParserError>;
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    products: Option<Vec<CardProduct>>,
}

#[derive(Debug, Deserialize)]
struct CardProduct {
    id: Option<u64>,
    #[serde(default)]
    sizes: Vec<CardSize>,
}

#[derive(Debug, Deserialize)]
struct CardSize {
    price: Option<CardPrice>,
    #[serde(default)]
    stocks: Vec<CardStock>,
}

#[derive(Debug, Deserialize)]
struct CardPrice {
    basic: Option<u64>,
    product: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CardStock {
    #[serde(default)]
    qty: u64,
}

pub struct CardParser;

impl CardParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CardParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for CardParser {
    /// Extracts the price quote for `product_id` from a card response body.
    ///
    /// The first size carrying both `basic` and `product` prices supplies the
    /// quote; `qty` is the total over every stock entry of every size.
    fn parse(&self, body: &[u8], product_id: ProductId) -> Result<PriceQuote, ParserError> {
        let response: CardResponse =
            serde_json::from_slice(body).map_err(|e| ParserError::InvalidJson(e.to_string()))?;

        let products = response
            .products
            .ok_or_else(|| ParserError::MissingField("products".into()))?;

        let product = products
            .iter()
            .find(|p| p.id == Some(product_id))
            .ok_or(ParserError::ProductAbsent(product_id))?;

        let (basic, price) = product
            .sizes
            .iter()
            .filter_map(|s| s.price.as_ref())
            .find_map(|p| Some((p.basic?, p.product?)))
            .ok_or_else(|| ParserError::MissingField("sizes[].price".into()))?;

        let qty = product
            .sizes
            .iter()
            .flat_map(|s| s.stocks.iter())
            .map(|s| s.qty)
            .sum();

        Ok(PriceQuote {
            basic,
            product: price,
            qty,
        })
    }
}

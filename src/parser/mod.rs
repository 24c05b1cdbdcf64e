// Product card parsing for the catalog API responses

pub mod card_parser;

pub use card_parser::{CardParser, Parser};

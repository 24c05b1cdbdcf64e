// Durable cycle history

pub mod sqlite;

pub use sqlite::SqliteStorage;

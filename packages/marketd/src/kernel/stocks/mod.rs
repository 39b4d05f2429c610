//! The shared stock index: tracked instruments and their per-component
//! collection state.

pub mod entry;
pub mod memory;
pub mod postgres;
pub mod store;

pub use entry::{Source, StockEntry, TimestampField, UnknownTimestampField};
pub use memory::MemoryStockIndex;
pub use postgres::PostgresStockIndex;
pub use store::StockIndex;

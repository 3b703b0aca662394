//! Persistence layer: rusqlite store, row types, usage aggregation.

pub mod rows;
pub mod schema;
mod store;
mod usage;

pub use store::Store;
pub use usage::{DateRange, ModelUsageSummary, UsageDay, UsageTotals};

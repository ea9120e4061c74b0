//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlUnit`: one item of crawl work (collection, group or item page)
//! - `UnitStatus`: the forward-only lifecycle of a unit

mod unit;
mod unit_status;

// Re-export main types
pub use unit::{CrawlUnit, UnitKind};
pub use unit_status::UnitStatus;

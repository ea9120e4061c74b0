//! Output module for run reports and summaries
//!
//! This module handles:
//! - Counting unit outcomes during a run
//! - Printing the end-of-run summary
//! - Exporting the summary as markdown

mod markdown;
mod report;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use report::{FailedUnit, RunReport};
pub use summary::{print_summary, RunSummary};

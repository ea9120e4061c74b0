use crate::record::Record;
use crate::state::CrawlUnit;
use thiserror::Error;

/// Errors raised while turning a page into children or records
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("{kind} units cannot be {operation}")]
    Unsupported {
        kind: crate::state::UnitKind,
        operation: &'static str,
    },

    #[error("Unexpected page content: {0}")]
    Content(String),
}

/// Site-specific page interpretation
///
/// Both operations are pure functions of the page and the unit; they never
/// touch the network.
pub trait Extractor: Send + Sync {
    /// Child units listed on a collection or group page
    fn discover_children(&self, html: &str, unit: &CrawlUnit) -> Result<Vec<CrawlUnit>, ExtractError>;

    /// Records on an item page
    fn extract_records(&self, html: &str, unit: &CrawlUnit) -> Result<Vec<Record>, ExtractError>;
}

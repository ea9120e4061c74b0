//! Configuration-driven extractor built on CSS selectors
//!
//! Collection and group pages are scanned for links; item pages are split
//! into record elements and each configured field is read from inside the
//! element. A field selector may end in `@attr` to read an attribute
//! instead of the element text.

use crate::config::ExtractConfig;
use crate::crawler::extractor::{ExtractError, Extractor};
use crate::record::Record;
use crate::state::{CrawlUnit, UnitKind};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

/// Attribute that overrides the URL-derived id of a discovered child
pub const UNIT_ID_ATTR: &str = "data-unit-id";

pub struct SelectorExtractor {
    config: ExtractConfig,
}

impl SelectorExtractor {
    /// Validates every selector in the configuration
    pub fn new(config: ExtractConfig) -> Result<Self, ExtractError> {
        let mut selectors: Vec<&str> = vec![config.record_selector.as_str()];
        selectors.extend(config.collection_links.as_deref());
        selectors.extend(config.group_links.as_deref());
        for field in config.fields.values() {
            selectors.push(split_field(field).0);
        }
        for selector in selectors {
            parse_selector(selector)?;
        }
        Ok(Self { config })
    }

    fn link_selector(&self, kind: UnitKind) -> Option<&str> {
        match kind {
            UnitKind::Collection => self.config.collection_links.as_deref(),
            UnitKind::Group => self.config.group_links.as_deref(),
            UnitKind::Item => None,
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Splits `td.name a@href` into (`td.name a`, Some(`href`))
fn split_field(spec: &str) -> (&str, Option<&str>) {
    match spec.rsplit_once('@') {
        Some((selector, attr)) if !attr.is_empty() => (selector.trim(), Some(attr.trim())),
        _ => (spec.trim(), None),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for empty, fragment-only and non-HTTP links.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:") {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

/// Unit id derived from a URL's path and query: `/teams/42?season=3` → `teams-42-season-3`
pub fn id_from_url(url: &Url) -> String {
    let mut parts: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if let Some(query) = url.query() {
        parts.extend(query.split(['&', '=']).filter(|s| !s.is_empty()));
    }
    if parts.is_empty() {
        return url.host_str().unwrap_or("root").to_string();
    }
    parts.join("-")
}

impl Extractor for SelectorExtractor {
    fn discover_children(&self, html: &str, unit: &CrawlUnit) -> Result<Vec<CrawlUnit>, ExtractError> {
        let Some(selector) = self.link_selector(unit.kind) else {
            return Err(ExtractError::Unsupported {
                kind: unit.kind,
                operation: "expanded into children",
            });
        };
        let selector = parse_selector(selector)?;
        let child_kind = match unit.kind {
            UnitKind::Collection => UnitKind::Group,
            _ => UnitKind::Item,
        };
        let base = Url::parse(&unit.url).map_err(|e| ExtractError::Content(e.to_string()))?;

        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut children = Vec::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_link(href, &base) else {
                continue;
            };
            let id = match element.value().attr(UNIT_ID_ATTR) {
                Some(id) if !id.trim().is_empty() => id.trim().to_string(),
                _ => id_from_url(&url),
            };
            if seen.insert(id.clone()) {
                children.push(CrawlUnit::child(unit, id, child_kind, url.to_string()));
            }
        }

        tracing::debug!("{} lists {} {} unit(s)", unit.id, children.len(), child_kind);
        Ok(children)
    }

    fn extract_records(&self, html: &str, unit: &CrawlUnit) -> Result<Vec<Record>, ExtractError> {
        if unit.kind != UnitKind::Item {
            return Err(ExtractError::Unsupported {
                kind: unit.kind,
                operation: "extracted into records",
            });
        }

        let record_selector = parse_selector(&self.config.record_selector)?;
        let mut fields = Vec::with_capacity(self.config.fields.len());
        for (name, spec) in &self.config.fields {
            let (selector, attr) = split_field(spec);
            fields.push((name, parse_selector(selector)?, attr));
        }

        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for element in document.select(&record_selector) {
            let mut record = Record::new();
            for (name, selector, attr) in &fields {
                let value = element.select(selector).next().and_then(|found| match attr {
                    Some(attr) => found.value().attr(attr).map(|v| v.trim().to_string()),
                    None => Some(element_text(found)),
                });
                record.insert(name.as_str(), value.map(Value::String).unwrap_or(Value::Null));
            }
            if let Some(unit_field) = &self.config.unit_field {
                record.insert(unit_field.as_str(), unit.id.as_str());
            }
            records.push(record);
        }

        Ok(records)
    }
}

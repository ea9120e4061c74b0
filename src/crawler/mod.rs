//! Crawler module for hierarchical, checkpointed crawls
//!
//! This module contains the crawl orchestration, including:
//! - The Extractor interface and a selector-based implementation
//! - Breadth-first frontier management
//! - Worker-pool processing of units with per-unit persistence
//! - The end-to-end run: crawl, consolidate, clear the checkpoint

mod coordinator;
mod extractor;
mod frontier;
mod selector;

pub use coordinator::{Coordinator, Disposition, FailureReason, RunOptions, UnitOutcome};
pub use extractor::{ExtractError, Extractor};
pub use frontier::Frontier;
pub use selector::{id_from_url, SelectorExtractor, UNIT_ID_ATTR};

use crate::config::{Config, RootEntry};
use crate::consolidate::{ConsolidationReport, Consolidator, MergePolicy};
use crate::fetch::FetchChain;
use crate::health::HealthTracker;
use crate::output::RunSummary;
use crate::pacing::PacingController;
use crate::record::FieldIdentity;
use crate::shutdown::Shutdown;
use crate::state::CrawlUnit;
use crate::storage::{CheckpointStore, TargetLayout};
use std::sync::Arc;

/// Root units selected by `only` (all roots when `only` is empty)
///
/// Ids in `only` that match no configured root are logged and ignored.
pub fn select_roots(roots: &[RootEntry], only: &[String]) -> Vec<CrawlUnit> {
    for id in only {
        if !roots.iter().any(|r| &r.id == id) {
            tracing::warn!("No root with id '{}' in the configuration", id);
        }
    }

    roots
        .iter()
        .filter(|r| only.is_empty() || only.contains(&r.id))
        .map(|r| CrawlUnit::root(&r.id, r.kind, &r.url))
        .collect()
}

/// Builds the consolidator for a target from its configuration
pub fn build_consolidator(config: &Config) -> Consolidator {
    Consolidator::new(
        TargetLayout::from_config(&config.target),
        Arc::new(FieldIdentity::new(config.merge.identity_fields.iter().cloned())),
        MergePolicy::from_config(&config.merge),
        config.target.backup_canonical,
    )
}

/// Runs a complete harvest of one target
///
/// This is the main entry point. It will:
/// 1. Load or discard the checkpoint
/// 2. Crawl the selected roots breadth-first
/// 3. Consolidate all unit files into the canonical dataset
/// 4. Clear the checkpoint if the run completed and consolidation succeeded
///
/// Unit-level failures never abort the run; only setup failures (the
/// target directory or HTTP clients) are returned as errors.
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Hash stored in the checkpoint to detect config changes
/// * `extractor` - Site-specific page interpretation
/// * `options` - Resume behaviour and root filter
/// * `shutdown` - Cooperative stop signal
pub async fn run_harvest(
    config: &Config,
    config_hash: Option<String>,
    extractor: Arc<dyn Extractor>,
    options: RunOptions,
    shutdown: Shutdown,
) -> crate::Result<RunSummary> {
    let layout = TargetLayout::from_config(&config.target);
    layout.ensure_dirs()?;

    let pacing = Arc::new(PacingController::new(config.pacing.clone()));
    let health = Arc::new(HealthTracker::new(
        config.health.clone(),
        config.fetch.proxies.clone(),
    ));
    let fetcher = Arc::new(FetchChain::from_config(
        &config.fetch,
        Arc::clone(&pacing),
        Arc::clone(&health),
        shutdown.clone(),
    )?);
    let checkpoint = Arc::new(CheckpointStore::new(layout.clone(), config_hash));

    let roots = select_roots(&config.roots, &options.only_roots);
    let coordinator = Coordinator::new(
        &config.crawl,
        fetcher,
        extractor,
        Arc::clone(&checkpoint),
        Arc::clone(&pacing),
        shutdown,
    )
    .with_options(options);

    let report = coordinator.run(roots).await;

    let consolidator = build_consolidator(config);
    let (consolidation, consolidation_error) =
        match tokio::task::spawn_blocking(move || consolidator.run()).await {
            Ok(Ok(consolidation)) => (Some(consolidation), None),
            Ok(Err(e)) => {
                tracing::error!("Consolidation failed: {}", e);
                (None, Some(e.to_string()))
            }
            Err(e) => {
                tracing::error!("Consolidation task failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

    let mut checkpoint_cleared = false;
    if report.is_complete() && consolidation.is_some() && config.target.clear_checkpoint_on_success {
        match checkpoint.clear().await {
            Ok(()) => {
                tracing::info!("Run complete, checkpoint cleared");
                checkpoint_cleared = true;
            }
            Err(e) => tracing::error!("Failed to clear checkpoint: {}", e),
        }
    }

    Ok(RunSummary {
        target: config.target.name.clone(),
        report,
        consolidation,
        consolidation_error,
        checkpoint_cleared,
        health: health.snapshot(),
    })
}

/// Merges existing unit files into the canonical dataset without crawling
pub fn consolidate_only(config: &Config) -> crate::Result<ConsolidationReport> {
    Ok(build_consolidator(config).run()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UnitKind;

    fn roots() -> Vec<RootEntry> {
        vec![
            RootEntry {
                id: "a".to_string(),
                url: "https://example.com/a".to_string(),
                kind: UnitKind::Collection,
            },
            RootEntry {
                id: "b".to_string(),
                url: "https://example.com/b".to_string(),
                kind: UnitKind::Group,
            },
        ]
    }

    #[test]
    fn test_select_all_roots() {
        let selected = select_roots(&roots(), &[]);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|u| u.is_root()));
        assert_eq!(selected[1].kind, UnitKind::Group);
    }

    #[test]
    fn test_select_only_roots() {
        let selected = select_roots(&roots(), &["b".to_string(), "zzz".to_string()]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "b");
    }
}

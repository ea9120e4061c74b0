//! Crawl coordinator - breadth-first orchestration of crawl units
//!
//! This module drives one crawl run:
//! - Seeding the frontier with root units
//! - Processing each depth as a wave on a bounded worker pool
//! - Skipping item units the checkpoint already has
//! - Persisting item records before checkpointing them
//! - Stopping cleanly when shutdown is requested

use crate::config::CrawlConfig;
use crate::crawler::extractor::Extractor;
use crate::crawler::frontier::Frontier;
use crate::fetch::{FetchChain, FetchError};
use crate::output::{FailedUnit, RunReport};
use crate::pacing::PacingController;
use crate::record::Record;
use crate::shutdown::Shutdown;
use crate::state::{CrawlUnit, UnitKind, UnitStatus};
use crate::storage::{CheckpointStore, CompletedSet, UnitFileStore};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// How a run treats existing progress
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Discard the checkpoint and start over
    pub fresh: bool,
    /// Only crawl these root ids (all roots when empty)
    pub only_roots: Vec<String>,
    /// Attempt units the checkpoint recorded as failed
    pub retry_failed: bool,
}

/// Why a unit failed
#[derive(Debug, Clone)]
pub enum FailureReason {
    FetchExhausted(Option<FetchError>),
    Extract(String),
    Persist(String),
    Panicked(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::FetchExhausted(Some(last)) => {
                write!(f, "all fetch strategies exhausted (last: {})", last)
            }
            FailureReason::FetchExhausted(None) => write!(f, "all fetch strategies exhausted"),
            FailureReason::Extract(e) => write!(f, "extraction failed: {}", e),
            FailureReason::Persist(e) => write!(f, "unit file write failed: {}", e),
            FailureReason::Panicked(e) => write!(f, "worker panicked: {}", e),
        }
    }
}

/// What happened to one unit
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Already checkpointed; not fetched
    Skipped,
    Done,
    Failed(FailureReason),
    /// Shutdown was requested before the unit finished
    Cancelled,
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: CrawlUnit,
    pub disposition: Disposition,
    pub children: Vec<CrawlUnit>,
    pub records: usize,
    pub attempts: u32,
}

impl UnitOutcome {
    fn new(unit: CrawlUnit, disposition: Disposition) -> Self {
        Self {
            unit,
            disposition,
            children: Vec::new(),
            records: 0,
            attempts: 0,
        }
    }
}

/// Everything a worker task needs, cheap to clone
#[derive(Clone)]
struct UnitContext {
    fetcher: Arc<FetchChain>,
    extractor: Arc<dyn Extractor>,
    checkpoint: Arc<CheckpointStore>,
    units: UnitFileStore,
    pacing: Arc<PacingController>,
    shutdown: Shutdown,
    completed: Arc<CompletedSet>,
    settle: bool,
}

/// Main crawl coordinator structure
pub struct Coordinator {
    fetcher: Arc<FetchChain>,
    extractor: Arc<dyn Extractor>,
    checkpoint: Arc<CheckpointStore>,
    pacing: Arc<PacingController>,
    shutdown: Shutdown,
    workers: usize,
    settle: bool,
    options: RunOptions,
}

impl Coordinator {
    pub fn new(
        crawl: &CrawlConfig,
        fetcher: Arc<FetchChain>,
        extractor: Arc<dyn Extractor>,
        checkpoint: Arc<CheckpointStore>,
        pacing: Arc<PacingController>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            checkpoint,
            pacing,
            shutdown,
            workers: crawl.workers.max(1),
            settle: crawl.settle_between_units,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads (or clears) the checkpoint according to the run options
    async fn prepare_checkpoint(&self) -> CompletedSet {
        if self.options.fresh {
            tracing::info!("Fresh run requested, discarding checkpoint");
            if let Err(e) = self.checkpoint.clear().await {
                tracing::error!("Failed to clear checkpoint: {}", e);
            }
        }

        let completed = match self.checkpoint.load().await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::error!("Failed to load checkpoint, starting without it: {}", e);
                CompletedSet::default()
            }
        };

        if self.options.retry_failed {
            self.checkpoint.forget_failed().await
        } else {
            completed
        }
    }

    /// Runs the crawl from `roots` until the frontier is empty or shutdown
    ///
    /// Never fails: unit-level errors are recorded in the report.
    pub async fn run(&self, roots: Vec<CrawlUnit>) -> RunReport {
        let mut report = RunReport {
            started_at: Some(Utc::now()),
            ..RunReport::default()
        };

        let completed = Arc::new(self.prepare_checkpoint().await);
        let ctx = UnitContext {
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            checkpoint: Arc::clone(&self.checkpoint),
            units: UnitFileStore::new(self.checkpoint.layout().clone()),
            pacing: Arc::clone(&self.pacing),
            shutdown: self.shutdown.clone(),
            completed,
            settle: self.settle,
        };

        let mut frontier = Frontier::new();
        frontier.extend(roots);

        tracing::info!(
            "Starting crawl: {} root unit(s), {} worker(s)",
            frontier.len(),
            self.workers
        );

        while !frontier.is_empty() {
            if self.shutdown.is_triggered() {
                report.cancelled += frontier.len();
                break;
            }

            let wave = frontier.take_wave();
            report.waves += 1;
            tracing::info!("Wave {}: {} unit(s)", report.waves, wave.len());

            for outcome in self.run_wave(&ctx, wave).await {
                record_outcome(&mut report, &outcome);
                frontier.extend(outcome.children);
            }
        }

        self.fetcher.close().await;

        report.discovered = frontier.discovered();
        report.interrupted = self.shutdown.is_triggered();
        report.finished_at = Some(Utc::now());

        tracing::info!(
            "Crawl {}: {} done, {} failed, {} skipped, {} cancelled, {} record(s)",
            if report.interrupted { "interrupted" } else { "finished" },
            report.succeeded,
            report.failed.len(),
            report.skipped,
            report.cancelled,
            report.records
        );

        report
    }

    /// Processes one wave on the worker pool
    ///
    /// Units not yet started when shutdown is requested are returned as
    /// cancelled. A panicking unit task is reported as failed.
    async fn run_wave(&self, ctx: &UnitContext, wave: Vec<CrawlUnit>) -> Vec<UnitOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::with_capacity(wave.len());

        let mut pending = wave.into_iter();
        for unit in pending.by_ref() {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
                _ = self.shutdown.triggered() => {
                    outcomes.push(UnitOutcome::new(unit, Disposition::Cancelled));
                    break;
                }
            };
            let Ok(permit) = permit else {
                outcomes.push(UnitOutcome::new(unit, Disposition::Cancelled));
                break;
            };

            let task_ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let task_unit = unit.clone();
                let worker = tokio::spawn(async move { process_unit(&task_ctx, task_unit).await });
                match worker.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let message = if e.is_panic() {
                            "panic".to_string()
                        } else {
                            e.to_string()
                        };
                        tracing::error!("Unit {} task failed: {}", unit.id, message);
                        UnitOutcome::new(unit, Disposition::Failed(FailureReason::Panicked(message)))
                    }
                }
            });
        }

        outcomes.extend(pending.map(|unit| UnitOutcome::new(unit, Disposition::Cancelled)));

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        outcomes
    }
}

fn record_outcome(report: &mut RunReport, outcome: &UnitOutcome) {
    report.fetch_attempts += u64::from(outcome.attempts);
    match &outcome.disposition {
        Disposition::Skipped => report.skipped += 1,
        Disposition::Done => {
            report.succeeded += 1;
            report.records += outcome.records;
        }
        Disposition::Failed(reason) => report.failed.push(FailedUnit {
            id: outcome.unit.id.clone(),
            kind: outcome.unit.kind,
            url: outcome.unit.url.clone(),
            reason: reason.to_string(),
        }),
        Disposition::Cancelled => report.cancelled += 1,
    }
}

fn advance(unit: &mut CrawlUnit, next: UnitStatus) {
    if let Err(e) = unit.transition(next) {
        tracing::error!("{}", e);
    }
}

/// Fetches, interprets and persists one unit
async fn process_unit(ctx: &UnitContext, mut unit: CrawlUnit) -> UnitOutcome {
    if unit.kind == UnitKind::Item && ctx.completed.contains(&unit.id) {
        tracing::debug!("Skipping checkpointed unit {}", unit.id);
        return UnitOutcome::new(unit, Disposition::Skipped);
    }
    if ctx.shutdown.is_triggered() {
        return UnitOutcome::new(unit, Disposition::Cancelled);
    }

    advance(&mut unit, UnitStatus::InProgress);

    // Once per unit, never between the requests of one unit
    ctx.fetcher.refresh_identities().await;

    let fetched = ctx.fetcher.fetch(&unit.url).await;
    let attempts = fetched.attempts;

    if fetched.cancelled {
        tracing::info!("Unit {} interrupted before it was fetched", unit.id);
        let mut outcome = UnitOutcome::new(unit, Disposition::Cancelled);
        outcome.attempts = attempts;
        return outcome;
    }

    let mut outcome = match fetched.html {
        Some(html) if unit.kind.discovers_children() => {
            match ctx.extractor.discover_children(&html, &unit) {
                Ok(children) => {
                    advance(&mut unit, UnitStatus::Done);
                    tracing::info!(
                        "{} {}: {} child unit(s)",
                        unit.kind,
                        unit.id,
                        children.len()
                    );
                    UnitOutcome {
                        children,
                        ..UnitOutcome::new(unit, Disposition::Done)
                    }
                }
                Err(e) => fail(unit, FailureReason::Extract(e.to_string())),
            }
        }
        Some(html) => match ctx.extractor.extract_records(&html, &unit) {
            Ok(records) => persist(ctx, unit, records, None).await,
            Err(e) => persist(ctx, unit, Vec::new(), Some(FailureReason::Extract(e.to_string()))).await,
        },
        None if unit.kind == UnitKind::Item => {
            let reason = FailureReason::FetchExhausted(fetched.last_failure);
            persist(ctx, unit, Vec::new(), Some(reason)).await
        }
        None => fail(unit, FailureReason::FetchExhausted(fetched.last_failure)),
    };
    outcome.attempts = attempts;

    if ctx.settle && !ctx.shutdown.is_triggered() {
        let delay = ctx.pacing.settle_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.shutdown.triggered() => {}
        }
    }

    outcome
}

fn fail(mut unit: CrawlUnit, reason: FailureReason) -> UnitOutcome {
    advance(&mut unit, UnitStatus::Failed);
    tracing::warn!("{} {} failed: {}", unit.kind, unit.id, reason);
    UnitOutcome::new(unit, Disposition::Failed(reason))
}

/// Writes the unit file, then checkpoints the unit
///
/// A failed item still gets an empty unit file and a checkpoint entry
/// flagged as failed, so it is not retried on every resume. If the unit
/// file cannot be written the unit is not checkpointed.
async fn persist(
    ctx: &UnitContext,
    unit: CrawlUnit,
    records: Vec<Record>,
    failure: Option<FailureReason>,
) -> UnitOutcome {
    if let Err(e) = ctx.units.write(&unit.id, &records) {
        tracing::error!("Failed to write unit file for {}: {}", unit.id, e);
        return fail(unit, FailureReason::Persist(e.to_string()));
    }

    if let Err(e) = ctx.checkpoint.save(&unit.id, &records, failure.is_some()).await {
        tracing::error!("Failed to checkpoint {}: {}", unit.id, e);
    }

    match failure {
        Some(reason) => fail(unit, reason),
        None => {
            let mut unit = unit;
            advance(&mut unit, UnitStatus::Done);
            tracing::info!("{} {}: {} record(s)", unit.kind, unit.id, records.len());
            UnitOutcome {
                records: records.len(),
                ..UnitOutcome::new(unit, Disposition::Done)
            }
        }
    }
}

//! End-of-run summary printed by the binary

use crate::consolidate::ConsolidationReport;
use crate::health::ProxyHealth;
use crate::output::report::RunReport;

/// Everything a harvest run reports back to its caller
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Target name from the configuration
    pub target: String,

    pub report: RunReport,

    /// Present when consolidation succeeded
    pub consolidation: Option<ConsolidationReport>,

    /// Present when consolidation failed; the canonical file was left alone
    pub consolidation_error: Option<String>,

    /// The checkpoint was removed after a complete, consolidated run
    pub checkpoint_cleared: bool,

    /// Per-identity counters at the end of the run
    pub health: Vec<ProxyHealth>,
}

impl RunSummary {
    /// Share of finished units that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let finished = self.report.succeeded + self.report.failed.len();
        if finished == 0 {
            0.0
        } else {
            (self.report.succeeded as f64 / finished as f64) * 100.0
        }
    }

    /// Short status word for logs and headings
    pub fn status(&self) -> &'static str {
        if self.report.interrupted {
            "interrupted"
        } else if self.consolidation_error.is_some() {
            "consolidation failed"
        } else if self.report.failed.is_empty() {
            "completed"
        } else {
            "completed with failures"
        }
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    let report = &summary.report;

    println!("=== Harvest Summary: {} ===\n", summary.target);

    println!("Run:");
    println!("  Status: {}", summary.status());
    if let Some(seconds) = report.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Waves: {}", report.waves);
    println!("  Fetch attempts: {}", report.fetch_attempts);
    println!();

    println!("Units:");
    println!("  Discovered: {}", report.discovered);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed: {}", report.failed.len());
    println!("  Skipped (checkpointed): {}", report.skipped);
    println!("  Cancelled: {}", report.cancelled);
    println!("  Records written: {}", report.records);
    println!();

    if !report.failed.is_empty() {
        println!("Failed Units ({}):", report.failed.len());
        for failed in &report.failed {
            println!("  - {} [{}] {}: {}", failed.id, failed.kind, failed.url, failed.reason);
        }
        println!();
    }

    match (&summary.consolidation, &summary.consolidation_error) {
        (Some(c), _) => {
            println!("Consolidation:");
            println!("  Canonical: {}", c.canonical.display());
            println!("  Unit files: {}", c.unit_files);
            println!(
                "  Records: {} ({} new, {} merged, {} dropped without key)",
                c.stats.total, c.stats.new_keys, c.stats.merged, c.stats.skipped_no_key
            );
            if c.stats.kept_no_key > 0 {
                println!("  Kept without key: {}", c.stats.kept_no_key);
            }
            if !c.written {
                println!("  Unchanged, nothing written");
            }
            if let Some(backup) = &c.backup {
                println!("  Backup: {}", backup.display());
            }
            for skipped in &c.skipped_files {
                println!("  Skipped unreadable file: {}", skipped.display());
            }
            println!();
        }
        (None, Some(e)) => {
            println!("Consolidation failed: {}\n", e);
        }
        (None, None) => {}
    }

    if !summary.health.is_empty() {
        println!("Identities:");
        for h in &summary.health {
            println!(
                "  {}: {} requests, {} failed ({:.1}%), {} detections",
                h.identity,
                h.total,
                h.failed,
                h.failure_rate() * 100.0,
                h.detections
            );
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} units)",
        summary.success_rate(),
        report.succeeded,
        report.succeeded + report.failed.len()
    );
    if summary.checkpoint_cleared {
        println!("Checkpoint cleared");
    } else if !report.is_complete() {
        println!("Checkpoint kept; run again to resume");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FailedUnit;
    use crate::state::UnitKind;

    fn summary() -> RunSummary {
        RunSummary {
            target: "league".to_string(),
            report: RunReport {
                succeeded: 3,
                failed: vec![FailedUnit {
                    id: "team-9".to_string(),
                    kind: UnitKind::Item,
                    url: "https://example.com/t/9".to_string(),
                    reason: "fetch exhausted".to_string(),
                }],
                ..RunReport::default()
            },
            consolidation: None,
            consolidation_error: None,
            checkpoint_cleared: false,
            health: Vec::new(),
        }
    }

    #[test]
    fn test_success_rate_and_status() {
        let mut s = summary();
        assert!((s.success_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(s.status(), "completed with failures");

        s.report.interrupted = true;
        assert_eq!(s.status(), "interrupted");

        s.report = RunReport::default();
        assert_eq!(s.success_rate(), 0.0);
    }
}

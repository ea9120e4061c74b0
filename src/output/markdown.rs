//! Markdown export of a run summary

use crate::output::summary::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a run summary as markdown to `output_path`
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let report = &summary.report;
    let mut md = String::new();

    md.push_str(&format!("# Harvest Summary: {}\n\n", summary.target));

    // Run metadata
    md.push_str("## Run Information\n\n");
    if let Some(started) = report.started_at {
        md.push_str(&format!("- **Started**: {}\n", started.to_rfc3339()));
    }
    if let Some(finished) = report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = report.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status()));
    md.push_str(&format!("- **Waves**: {}\n", report.waves));
    md.push_str(&format!("- **Fetch Attempts**: {}\n\n", report.fetch_attempts));

    md.push_str("## Units\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Discovered | {} |\n", report.discovered));
    md.push_str(&format!("| Succeeded | {} |\n", report.succeeded));
    md.push_str(&format!("| Failed | {} |\n", report.failed.len()));
    md.push_str(&format!("| Skipped | {} |\n", report.skipped));
    md.push_str(&format!("| Cancelled | {} |\n\n", report.cancelled));
    md.push_str(&format!(
        "- **Records Written**: {}\n- **Success Rate**: {:.2}%\n\n",
        report.records,
        summary.success_rate()
    ));

    if !report.failed.is_empty() {
        md.push_str("## Failed Units\n\n");
        md.push_str("| Unit | Kind | URL | Reason |\n");
        md.push_str("|------|------|-----|--------|\n");
        for failed in &report.failed {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failed.id,
                failed.kind,
                failed.url,
                failed.reason.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md.push_str("## Consolidation\n\n");
    match (&summary.consolidation, &summary.consolidation_error) {
        (Some(c), _) => {
            md.push_str(&format!("- **Canonical**: {}\n", c.canonical.display()));
            md.push_str(&format!("- **Unit Files**: {}\n", c.unit_files));
            md.push_str(&format!("- **Total Records**: {}\n", c.stats.total));
            md.push_str(&format!("- **New Keys**: {}\n", c.stats.new_keys));
            md.push_str(&format!("- **Merged**: {}\n", c.stats.merged));
            md.push_str(&format!("- **Dropped Without Key**: {}\n", c.stats.skipped_no_key));
            md.push_str(&format!("- **Kept Without Key**: {}\n", c.stats.kept_no_key));
            md.push_str(&format!("- **Written**: {}\n", c.written));
            if let Some(backup) = &c.backup {
                md.push_str(&format!("- **Backup**: {}\n", backup.display()));
            }
        }
        (None, Some(e)) => md.push_str(&format!("Failed: {}\n", e)),
        (None, None) => md.push_str("Not run\n"),
    }
    md.push_str(&format!(
        "- **Checkpoint Cleared**: {}\n\n",
        summary.checkpoint_cleared
    ));

    if !summary.health.is_empty() {
        md.push_str("## Identities\n\n");
        md.push_str("| Identity | Requests | Failed | Detections |\n");
        md.push_str("|----------|----------|--------|------------|\n");
        for h in &summary.health {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                h.identity, h.total, h.failed, h.detections
            ));
        }
        md.push('\n');
    }

    md
}

//! Audit command - read and verify a record's audit trail
//!
//! Provides the `recordkeeper audit <ID>` CLI command which:
//! 1. Reads the record's entries in sequence order
//! 2. Filters them by action and time (`--since` takes "1h", "2d", "2024-01-01")
//! 3. With `--verify`, replays the full trail and reports any violation
//!
//! Changesets are summarized by field name; values are never printed.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use recordkeeper_audit::LedgerCheck;
use recordkeeper_core::domain::{AuditAction, AuditEntry, RecordId};
use tracing::info;

use super::{CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Record whose trail to read
    pub id: RecordId,

    /// Show entries since this time (e.g., "1h", "2d", "2024-01-01")
    #[arg(long)]
    pub since: Option<String>,

    /// Filter by action (created, rectified, accessed, exported, ...)
    #[arg(long)]
    pub action: Option<AuditAction>,

    /// Maximum number of entries to show
    #[arg(long, default_value = "50")]
    pub limit: usize,

    /// Check the whole trail for gaps and illegal transitions
    #[arg(long)]
    pub verify: bool,
}

/// What the command read, before formatting
struct AuditView {
    entries: Vec<AuditEntry>,
    total: usize,
    check: Option<LedgerCheck>,
}

impl AuditCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();

        let since = match &self.since {
            Some(since_str) => {
                let parsed = parse_since(since_str, Utc::now()).with_context(|| {
                    format!(
                        "Invalid --since value: '{}'. Expected formats: '1h', '30m', '2d', '1w', '2024-01-01', '2024-01-01T12:00:00'",
                        since_str
                    )
                })?;
                info!(since = %parsed, "Filtering audit entries since");
                Some(parsed)
            }
            None => None,
        };

        let services = ctx.open().await?;
        let result = self.run(&services, since).await;
        services.close().await;
        let view = result?;

        info!(record_id = %self.id, count = view.entries.len(), "Retrieved audit entries");

        if format.is_json() {
            let entries_json: Vec<serde_json::Value> = view.entries.iter().map(entry_json).collect();
            let mut json = serde_json::json!({
                "id": self.id.to_string(),
                "total": view.total,
                "count": view.entries.len(),
                "entries": entries_json,
            });
            if let Some(check) = &view.check {
                json["verification"] = serde_json::json!({
                    "intact": check.is_intact(),
                    "entries": check.entries,
                    "violations": check.violations.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
                });
            }
            printer.print_json(&json);
            return Ok(());
        }

        if view.entries.is_empty() {
            printer.info("No audit entries found for the specified criteria.");
        } else {
            printer.success(&format!(
                "Audit trail of {} ({} of {} entries)",
                self.id,
                view.entries.len(),
                view.total
            ));
            printer.info("");
            printer.info("  Seq  Timestamp            Action              Actor            Details");
            printer.info("  ---- ------------------- ------------------- ---------------- -------");

            for entry in &view.entries {
                printer.info(&format!(
                    "  {:<4} {} {:<19} {:<16} {}",
                    entry.sequence().unwrap_or_default(),
                    entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
                    entry.action().to_string(),
                    truncate_string(entry.actor(), 16),
                    format_details(entry)
                ));
            }

            if view.entries.len() >= self.limit {
                printer.info("");
                printer.info(&format!(
                    "Showing {} entries (limit). Use --limit to show more.",
                    self.limit
                ));
            }
        }

        if let Some(check) = &view.check {
            printer.info("");
            if check.is_intact() {
                printer.success(&format!("Trail intact ({} entries)", check.entries));
            } else {
                printer.warn(&format!(
                    "Trail has {} violation{}",
                    check.violations.len(),
                    if check.violations.len() == 1 { "" } else { "s" }
                ));
                for violation in &check.violations {
                    printer.info(&format!("  {}", violation));
                }
            }
        }

        Ok(())
    }

    async fn run(&self, services: &Services, since: Option<DateTime<Utc>>) -> Result<AuditView> {
        let all = services.ledger.read_all(&self.id).await?;
        let total = all.len();

        let entries: Vec<AuditEntry> = all
            .into_iter()
            .filter(|entry| self.action.map_or(true, |action| entry.action() == action))
            .filter(|entry| since.map_or(true, |since| entry.timestamp() >= since))
            .take(self.limit)
            .collect();

        let check = if self.verify {
            Some(services.ledger.verify(&self.id).await?)
        } else {
            None
        };

        Ok(AuditView {
            entries,
            total,
            check,
        })
    }
}

fn entry_json(entry: &AuditEntry) -> serde_json::Value {
    serde_json::json!({
        "sequence": entry.sequence(),
        "timestamp": entry.timestamp().to_rfc3339(),
        "action": entry.action().to_string(),
        "actor": entry.actor(),
        "sourceIp": entry.source_ip(),
        "userAgent": entry.user_agent(),
        "purpose": entry.purpose(),
        "legalBasis": entry.legal_basis(),
        "changedFields": entry
            .changes()
            .map(|changes| changes.fields().iter().map(|f| f.as_str()).collect::<Vec<_>>()),
    })
}

/// Parse the --since argument into a DateTime<Utc>
///
/// Supports:
/// - Relative: "1h" (1 hour ago), "30m" (30 minutes), "2d" (2 days), "1w" (1 week)
/// - Absolute date: "2024-01-01"
/// - Absolute datetime: "2024-01-01T12:00:00"
fn parse_since(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(duration) = parse_relative_duration(input) {
        return Ok(now - duration);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let datetime = date
            .and_hms_opt(0, 0, 0)
            .context("Failed to create datetime from date")?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    anyhow::bail!("Could not parse '{}' as a time", input)
}

/// Parse relative duration strings like "1h", "30m", "2d", "1w"
fn parse_relative_duration(input: &str) -> Option<chrono::Duration> {
    if input.len() < 2 {
        return None;
    }

    let (num_str, unit) = input.split_at(input.len() - 1);
    let num: i64 = num_str.parse().ok()?;

    match unit {
        "m" => Some(chrono::Duration::minutes(num)),
        "h" => Some(chrono::Duration::hours(num)),
        "d" => Some(chrono::Duration::days(num)),
        "w" => Some(chrono::Duration::weeks(num)),
        _ => None,
    }
}

/// Short summary of an entry: changed fields, else purpose, else legal basis
fn format_details(entry: &AuditEntry) -> String {
    if let Some(changes) = entry.changes() {
        let fields: Vec<&str> = changes.fields().iter().map(|f| f.as_str()).collect();
        return truncate_string(&fields.join(", "), 40);
    }
    entry
        .purpose()
        .or(entry.legal_basis())
        .map(|s| truncate_string(s, 40))
        .unwrap_or_default()
}

/// Truncate a string to a maximum number of characters
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

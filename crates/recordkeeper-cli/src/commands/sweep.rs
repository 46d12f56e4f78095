//! Sweep command - run one retention sweep now
//!
//! Erases every record whose scheduled deletion is at or before the sweep
//! instant, exactly as one tick of the daemon's scheduler would.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use recordkeeper_lifecycle::SweepReport;

use super::{CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct SweepCommand {
    /// Sweep as of this RFC 3339 instant instead of now
    #[arg(long)]
    pub at: Option<String>,
}

impl SweepCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        let at = self.instant()?;

        let services = ctx.open().await?;
        let result = self.run(&services, at).await;
        services.close().await;
        let report = result?;

        if format.is_json() {
            let errors: Vec<serde_json::Value> = report
                .errors
                .iter()
                .map(|(id, e)| {
                    serde_json::json!({
                        "id": id.to_string(),
                        "code": e.code(),
                        "error": e.to_string(),
                    })
                })
                .collect();
            printer.print_json(&serde_json::json!({
                "success": report.is_clean(),
                "scanned": report.scanned,
                "erased": report.erased,
                "alreadyErased": report.already_erased,
                "failed": report.failed,
                "errors": errors,
            }));
            return Ok(());
        }

        if report.scanned == 0 {
            printer.success("No records due for erasure");
            return Ok(());
        }

        printer.success(&format!(
            "Sweep complete: {} erased of {} due",
            report.erased, report.scanned
        ));
        if report.already_erased > 0 {
            printer.info(&format!("Already erased: {}", report.already_erased));
        }
        for (id, e) in &report.errors {
            printer.warn(&format!("{}: {}", id, e));
        }
        Ok(())
    }

    fn instant(&self) -> Result<Option<DateTime<Utc>>> {
        self.at
            .as_deref()
            .map(|at| {
                DateTime::parse_from_rfc3339(at)
                    .map(|t| t.with_timezone(&Utc))
                    .with_context(|| format!("Invalid --at value: '{}'", at))
            })
            .transpose()
    }

    async fn run(&self, services: &Services, at: Option<DateTime<Utc>>) -> Result<SweepReport> {
        let now = at.unwrap_or_else(|| services.clock.now());
        let report = services.scheduler().run_once(now).await?;
        Ok(report)
    }
}

//! Export command - compile a subject access export
//!
//! The export document is always JSON. It goes to stdout unless `--output`
//! names a file. Compiling it is itself logged on the record's trail.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use recordkeeper_core::domain::RecordId;
use recordkeeper_lifecycle::ExportPayload;

use super::{CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Record to export
    pub id: RecordId,

    /// Write the export to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        let services = ctx.open().await?;

        let result = self.run(&services, ctx).await;
        services.close().await;
        let payload = result?;

        let document =
            serde_json::to_string_pretty(&payload).context("Failed to serialize export")?;

        match &self.output {
            Some(path) => {
                std::fs::write(path, document.as_bytes())
                    .with_context(|| format!("Failed to write export to {}", path.display()))?;
                if format.is_json() {
                    printer.print_json(&serde_json::json!({
                        "success": true,
                        "id": self.id.to_string(),
                        "output": path.display().to_string(),
                        "entries": payload.audit_log.len(),
                    }));
                } else {
                    printer.success(&format!("Exported record {}", self.id));
                    printer.info(&format!("Written to {}", path.display()));
                    printer.info(&format!("Audit entries: {}", payload.audit_log.len()));
                }
            }
            None => println!("{}", document),
        }
        Ok(())
    }

    async fn run(&self, services: &Services, ctx: &CommandContext) -> Result<ExportPayload> {
        let payload = services.export.compile_export(&self.id, &ctx.request()).await?;
        Ok(payload)
    }
}

//! Erase command - pseudonymize a record on request
//!
//! Erasing an already erased record succeeds and only logs the request.

use anyhow::Result;
use clap::Args;
use recordkeeper_audit::ErasureReason;
use recordkeeper_core::domain::RecordId;
use recordkeeper_lifecycle::ErasureOutcome;

use super::{CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct EraseCommand {
    /// Record to erase
    pub id: RecordId,

    /// Why the record is erased (subject_request, retention_expired)
    #[arg(long, default_value = "subject_request")]
    pub reason: ErasureReason,
}

impl EraseCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        let services = ctx.open().await?;

        let result = self.run(&services, ctx).await;
        services.close().await;
        let outcome = result?;

        if format.is_json() {
            printer.print_json(&serde_json::json!({
                "success": true,
                "id": self.id.to_string(),
                "outcome": outcome.to_string(),
                "sequence": outcome.sequence(),
            }));
        } else {
            match outcome {
                ErasureOutcome::Finalized { .. } => {
                    printer.success(&format!("Erased record {}", self.id));
                }
                ErasureOutcome::AlreadyErased { .. } => {
                    printer.success(&format!("Record {} was already erased", self.id));
                    printer.info("The request has been logged");
                }
            }
            printer.info(&format!("Reason: {}", self.reason));
        }
        Ok(())
    }

    async fn run(&self, services: &Services, ctx: &CommandContext) -> Result<ErasureOutcome> {
        let outcome = services
            .erasure
            .erase(&self.id, &ctx.request(), self.reason)
            .await?;
        Ok(outcome)
    }
}

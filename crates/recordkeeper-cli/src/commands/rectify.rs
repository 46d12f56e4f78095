//! Rectify command - correct or clear fields of an active record

use anyhow::Result;
use clap::Args;
use recordkeeper_core::domain::{Changeset, PiiField, RecordId, RecordPatch};

use super::{parse_assignment, parse_field, CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct RectifyCommand {
    /// Record to rectify
    pub id: RecordId,

    /// New value as FIELD=VALUE (repeatable)
    #[arg(long = "set", short = 's', value_parser = parse_assignment)]
    pub set: Vec<(PiiField, String)>,

    /// Field to remove from the record (repeatable)
    #[arg(long = "clear", value_parser = parse_field)]
    pub clear: Vec<PiiField>,
}

impl RectifyCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        if self.set.is_empty() && self.clear.is_empty() {
            anyhow::bail!("Nothing to rectify: pass at least one --set or --clear");
        }

        let services = ctx.open().await?;
        let result = self.run(&services, ctx).await;
        services.close().await;
        let changes = result?;

        // Values are personal data; only field names are echoed back
        let fields: Vec<&str> = changes.fields().iter().map(|f| f.as_str()).collect();
        if format.is_json() {
            printer.print_json(&serde_json::json!({
                "success": true,
                "id": self.id.to_string(),
                "changed": fields,
            }));
        } else if changes.is_empty() {
            printer.success(&format!("Record {} already up to date", self.id));
        } else {
            printer.success(&format!("Rectified record {}", self.id));
            printer.info(&format!("Changed: {}", fields.join(", ")));
        }
        Ok(())
    }

    async fn run(&self, services: &Services, ctx: &CommandContext) -> Result<Changeset> {
        let patch = self.patch();
        let changes = services.store.rectify(&self.id, &patch, &ctx.request()).await?;
        Ok(changes)
    }

    fn patch(&self) -> RecordPatch {
        let patch = self
            .set
            .iter()
            .fold(RecordPatch::new(), |patch, (field, value)| {
                patch.set(*field, value.clone())
            });
        self.clear
            .iter()
            .fold(patch, |patch, field| patch.clear(*field))
    }
}

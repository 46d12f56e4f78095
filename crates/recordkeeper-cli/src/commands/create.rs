//! Create command - register a new record behind the consent gate
//!
//! `recordkeeper create --field name="Ada Lovelace" --field email=ada@example.com --marketing`
//!
//! Without `--marketing` the consent gate refuses the record and nothing is
//! written.

use anyhow::Result;
use clap::Args;
use recordkeeper_core::domain::{ConsentClaim, PersonalData, PiiField, Record, RecordId};
use tracing::info;

use super::{parse_assignment, CommandContext, Services};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct CreateCommand {
    /// Personal-data field as FIELD=VALUE (repeatable)
    #[arg(long = "field", short = 'f', value_parser = parse_assignment, required = true)]
    pub fields: Vec<(PiiField, String)>,

    /// The data subject granted marketing consent
    #[arg(long)]
    pub marketing: bool,

    /// The data subject granted analytics consent
    #[arg(long)]
    pub analytics: bool,

    /// Version of the consent text that was accepted
    #[arg(long)]
    pub consent_version: Option<String>,

    /// Retention period in days (defaults to the configured period)
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Use this record id instead of generating one
    #[arg(long)]
    pub id: Option<RecordId>,
}

impl CreateCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        let services = ctx.open().await?;

        let result = self.run(&services, ctx).await;
        services.close().await;
        let record = result?;

        let retention = record.retention();
        if format.is_json() {
            printer.print_json(&serde_json::json!({
                "success": true,
                "id": record.id().to_string(),
                "fields": record.personal_data().len(),
                "createdAt": retention.created_at().to_rfc3339(),
                "scheduledDeletion": retention.scheduled_deletion().to_rfc3339(),
            }));
        } else {
            printer.success(&format!("Created record {}", record.id()));
            printer.info(&format!("Fields:             {}", record.personal_data().len()));
            printer.info(&format!(
                "Scheduled deletion: {} ({} days)",
                retention.scheduled_deletion().format("%Y-%m-%d %H:%M:%S UTC"),
                retention.retention_period_days()
            ));
        }
        Ok(())
    }

    async fn run(&self, services: &Services, ctx: &CommandContext) -> Result<Record> {
        let mut data = PersonalData::new();
        for (field, value) in &self.fields {
            data = data.with(*field, value.clone())?;
        }

        let claim = ConsentClaim {
            marketing_granted: Some(self.marketing),
            analytics_granted: Some(self.analytics),
            consent_date: None,
            consent_version: self.consent_version.clone(),
        };
        let id = self.id.unwrap_or_default();
        let request = ctx.request();

        let record = match self.retention_days {
            Some(days) => {
                services
                    .store
                    .create_with_retention(id, data, &claim, days, &request)
                    .await?
            }
            None => services.store.create(id, data, &claim, &request).await?,
        };

        info!(record_id = %id, "Record created from CLI");
        Ok(record)
    }
}

//! Show command - read one record, or list records without their data
//!
//! Reading a record's personal data is a processing event, so `show <ID>`
//! requires a purpose and logs an `accessed` entry. The listing form only
//! prints ids, states and retention dates.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use recordkeeper_core::{
    domain::{Record, RecordId},
    ports::RecordFilter,
};

use super::{CommandContext, Services};
use crate::output::{OutputFormat, Printer};

#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Record to show; omit to list records
    pub id: Option<RecordId>,

    /// Why the record is being read (required with an id)
    #[arg(long)]
    pub purpose: Option<String>,

    /// List only erased records
    #[arg(long, conflicts_with = "active")]
    pub erased: bool,

    /// List only records that are not erased
    #[arg(long)]
    pub active: bool,

    /// List only records whose scheduled deletion has passed
    #[arg(long)]
    pub due: bool,
}

impl ShowCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();

        let purpose = match (&self.id, &self.purpose) {
            (Some(_), None) => anyhow::bail!("Reading a record requires --purpose"),
            (_, purpose) => purpose.as_deref(),
        };

        let services = ctx.open().await?;
        let result = match (self.id, purpose) {
            (Some(id), Some(purpose)) => self
                .inspect(&services, ctx, id, purpose)
                .await
                .map(|record| vec![record]),
            _ => self.list(&services).await,
        };
        services.close().await;
        let records = result?;

        if self.id.is_some() {
            for record in &records {
                print_record(&printer, record, format)?;
            }
            return Ok(());
        }

        if format.is_json() {
            let rows: Vec<serde_json::Value> = records.iter().map(summary_json).collect();
            printer.print_json(&serde_json::json!({
                "count": rows.len(),
                "records": rows,
            }));
            return Ok(());
        }

        if records.is_empty() {
            printer.info("No records found for the specified criteria.");
            return Ok(());
        }

        printer.success(&format!("Records ({})", records.len()));
        printer.info("");
        printer.info("  Id                                    State    Scheduled deletion");
        printer.info("  ------------------------------------ -------- -------------------");
        for record in &records {
            printer.info(&format!(
                "  {} {:<8} {}",
                record.id(),
                record.state().to_string(),
                format_time(record.retention().scheduled_deletion())
            ));
        }
        Ok(())
    }

    async fn inspect(
        &self,
        services: &Services,
        ctx: &CommandContext,
        id: RecordId,
        purpose: &str,
    ) -> Result<Record> {
        let record = services.export.inspect(&id, &ctx.request(), purpose).await?;
        Ok(record)
    }

    async fn list(&self, services: &Services) -> Result<Vec<Record>> {
        let records = services.store.list(&self.filter(services.clock.now())).await?;
        Ok(records)
    }

    fn filter(&self, now: DateTime<Utc>) -> RecordFilter {
        let mut filter = RecordFilter::new();
        if self.erased {
            filter = filter.with_erased(true);
        } else if self.active {
            filter = filter.with_erased(false);
        }
        if self.due {
            filter = filter.with_scheduled_deletion_until(now);
        }
        filter
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn summary_json(record: &Record) -> serde_json::Value {
    let retention = record.retention();
    serde_json::json!({
        "id": record.id().to_string(),
        "state": record.state().to_string(),
        "createdAt": retention.created_at().to_rfc3339(),
        "scheduledDeletion": retention.scheduled_deletion().to_rfc3339(),
        "erasedAt": retention.erased_at().map(|t| t.to_rfc3339()),
    })
}

fn print_record(
    printer: &Printer,
    record: &Record,
    format: OutputFormat,
) -> Result<()> {
    if format.is_json() {
        printer.print_json(&serde_json::to_value(record)?);
        return Ok(());
    }

    let retention = record.retention();
    let consent = record.consent();
    printer.success(&format!("Record {} ({})", record.id(), record.state()));
    printer.info("");
    for (field, value) in record.personal_data().iter() {
        printer.info(&format!("{:<14} {}", field.as_str(), value));
    }
    printer.info("");
    printer.info(&format!(
        "Consent:       marketing={} analytics={} version={} ({})",
        consent.marketing_granted,
        consent.analytics_granted,
        consent.consent_version,
        format_time(consent.consent_date)
    ));
    printer.info(&format!("Created:       {}", format_time(retention.created_at())));
    printer.info(&format!(
        "Deletion due:  {} ({} days)",
        format_time(retention.scheduled_deletion()),
        retention.retention_period_days()
    ));
    if let Some(erased_at) = retention.erased_at() {
        printer.info(&format!("Erased:        {}", format_time(erased_at)));
    }
    Ok(())
}

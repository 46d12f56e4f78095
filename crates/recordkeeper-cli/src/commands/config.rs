//! Config command - View and validate RecordKeeper configuration
//!
//! Provides the `recordkeeper config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors
//! 3. Prints the path the configuration is read from

use anyhow::{Context, Result};
use clap::Subcommand;
use recordkeeper_core::config::{Config, ValidationError};
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx, format),
            ConfigCommand::Validate => self.execute_validate(ctx, format),
            ConfigCommand::Path => self.execute_path(ctx, format),
        }
    }

    fn execute_show(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            printer.print_json(&json);
        } else {
            printer.success(&format!("Configuration ({})", ctx.config_path.display()));
            printer.info("");

            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                printer.info(line);
            }
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        let path = &ctx.config_path;

        // Load the file explicitly; the context holds defaults if it is missing
        let errors = match Config::load(path) {
            Ok(config) => {
                info!(config_path = %path.display(), "Validating configuration");
                config.validate().iter().map(ValidationError::to_string).collect()
            }
            Err(_) if !path.exists() => {
                if format.is_json() {
                    printer.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": ["Configuration file not found. Using defaults."],
                    }));
                } else {
                    printer.info(&format!("Configuration file not found at {}", path.display()));
                    printer.info("Using default configuration.");
                }
                return Ok(());
            }
            Err(e) => vec![format!("Failed to parse configuration: {:#}", e)],
        };

        if format.is_json() {
            printer.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": errors,
            }));
        } else if errors.is_empty() {
            printer.success("Configuration is valid");
            printer.info(&format!("File: {}", path.display()));
        } else {
            printer.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            printer.info(&format!("File: {}", path.display()));
            printer.info("");
            for error in &errors {
                printer.info(&format!("  {}", error));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("invalid configuration")
        }
    }

    fn execute_path(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let printer = format.printer();
        if format.is_json() {
            printer.print_json(&serde_json::json!({
                "config_path": ctx.config_path.display().to_string(),
                "exists": ctx.config_path.exists(),
            }));
        } else {
            println!("{}", ctx.config_path.display());
        }
        Ok(())
    }
}

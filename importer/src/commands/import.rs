use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{Command, CommandContext};
use crate::importer::{run_import, ImportOptions, ImportReport};
use crate::spreadsheet;

/// Command to create one calendar event per spreadsheet row
pub struct ImportCommand {
    pub file: PathBuf,
    pub sheet: Option<String>,
    pub dry_run: bool,
}

impl ImportCommand {
    fn options(&self, context: &CommandContext) -> ImportOptions {
        let config = context.config.read();
        ImportOptions {
            default_calendar: config.import.default_calendar.clone(),
            default_duration: config.default_event_duration(),
            writable_only: config.import.writable_calendars_only,
            timezone: config.import.timezone.clone(),
            dry_run: self.dry_run,
        }
    }

    fn print_report(&self, report: &ImportReport, debug: bool) -> Result<()> {
        if report.dry_run {
            for planned in &report.planned {
                println!("# row {} -> {}", planned.row_number, planned.calendar_id);
                println!("{}", serde_json::to_string_pretty(&planned.event)?);
            }
            println!("\n🧪 Dry run: {} events would be created", report.planned.len());
            return Ok(());
        }

        if debug {
            for (row, created) in &report.created {
                let link = created.html_link.as_deref().unwrap_or(&created.id);
                println!("   row {} -> {}", row, link);
            }
        }
        println!("✅ Success! Created {} events", report.created.len());
        Ok(())
    }
}

#[async_trait]
impl Command for ImportCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        println!("📄 Converting spreadsheet...");
        let rows = spreadsheet::read_sheet(&self.file, self.sheet.as_deref())
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        info!("Read {} event rows from {}", rows.len(), self.file.display());

        if rows.is_empty() {
            println!("ℹ️  No event rows found, nothing to do");
            return Ok(());
        }

        println!("🔗 Connecting to Google Calendar...");
        let service = context.calendar_service().await?;

        if !self.dry_run {
            println!("🔄 Updating Google Calendar...");
        }
        let report = run_import(&service, &rows, &self.options(context))
            .await
            .context("Import failed")?;

        self.print_report(&report, context.debug)
    }
}

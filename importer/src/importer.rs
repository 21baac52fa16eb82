use chrono::Duration;
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::errors::{ImportError, ImportResult, RowError};
use crate::event::{build_event, NewEvent};
use crate::google_calendar::{CalendarApi, CalendarListEntry, CreatedEvent};
use crate::spreadsheet::SheetRow;

/// Name that always refers to the account's main calendar
pub const PRIMARY_CALENDAR_NAME: &str = "Primary";
const PRIMARY_CALENDAR_ID: &str = "primary";

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub default_calendar: String,
    pub default_duration: Duration,
    pub writable_only: bool,
    /// Overrides the account's time zone setting
    pub timezone: Option<String>,
    pub dry_run: bool,
}

/// Calendar display names mapped to calendar ids
#[derive(Debug, Clone, Default)]
pub struct CalendarDirectory {
    by_name: HashMap<String, String>,
}

impl CalendarDirectory {
    pub fn from_entries(entries: &[CalendarListEntry], writable_only: bool) -> Self {
        let mut by_name: HashMap<String, String> = entries
            .iter()
            .filter(|entry| !writable_only || entry.is_writable())
            .map(|entry| (entry.summary.clone(), entry.id.clone()))
            .collect();

        by_name.insert(PRIMARY_CALENDAR_NAME.to_string(), PRIMARY_CALENDAR_ID.to_string());
        Self { by_name }
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name.get(name.trim()).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// An event ready to be sent, remembering which row it came from
#[derive(Debug, Clone)]
pub struct PlannedEvent {
    pub row_number: usize,
    pub calendar_id: String,
    pub event: NewEvent,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub planned: Vec<PlannedEvent>,
    pub created: Vec<(usize, CreatedEvent)>,
    pub dry_run: bool,
}

/// Validate every row and turn it into a planned event.
/// Nothing is returned unless all rows are valid.
pub fn plan_events(
    rows: &[SheetRow],
    directory: &CalendarDirectory,
    default_timezone: &str,
    options: &ImportOptions,
) -> ImportResult<Vec<PlannedEvent>> {
    let mut planned = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        let calendar_name = row
            .calendar_name
            .as_deref()
            .unwrap_or(&options.default_calendar);

        let calendar_id = directory.resolve(calendar_name);
        if calendar_id.is_none() {
            errors.push(RowError::new(
                row.row_number,
                format!(
                    "unknown calendar '{}' (known: {})",
                    calendar_name,
                    directory.names().join(", ")
                ),
            ));
        }

        match build_event(row, default_timezone, options.default_duration) {
            Ok(event) => {
                if let Some(calendar_id) = calendar_id {
                    planned.push(PlannedEvent {
                        row_number: row.row_number,
                        calendar_id: calendar_id.to_string(),
                        event,
                    });
                }
            }
            Err(message) => errors.push(RowError::new(row.row_number, message)),
        }
    }

    if errors.is_empty() {
        Ok(planned)
    } else {
        Err(ImportError::InvalidRows(errors))
    }
}

/// Create one event per row, in sheet order, stopping at the first failure
pub async fn run_import(
    api: &dyn CalendarApi,
    rows: &[SheetRow],
    options: &ImportOptions,
) -> ImportResult<ImportReport> {
    let default_timezone = match &options.timezone {
        Some(timezone) => timezone.clone(),
        None => api.default_timezone().await?,
    };
    debug!("Using default time zone {}", default_timezone);

    let calendars = api.list_calendars().await?;
    let directory = CalendarDirectory::from_entries(&calendars, options.writable_only);

    let planned = plan_events(rows, &directory, &default_timezone, options)?;
    info!("Planned {} events", planned.len());

    let mut report = ImportReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    if options.dry_run {
        report.planned = planned;
        return Ok(report);
    }

    for planned_event in &planned {
        match api
            .insert_event(&planned_event.calendar_id, &planned_event.event)
            .await
        {
            Ok(created) => report.created.push((planned_event.row_number, created)),
            Err(e) => {
                error!("Failed to create event for row {}: {}", planned_event.row_number, e);
                return Err(ImportError::Api {
                    service: "Google Calendar".to_string(),
                    message: format!(
                        "row {}: {} ({} of {} events were created before the failure)",
                        planned_event.row_number,
                        e,
                        report.created.len(),
                        planned.len()
                    ),
                });
            }
        }
    }

    report.planned = planned;
    Ok(report)
}

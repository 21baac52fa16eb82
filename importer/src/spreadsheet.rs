//! Reading event rows out of a workbook.
//!
//! The first row of the sheet holds the column headers; every following
//! non-blank row describes one event. Cells are converted to typed values here
//! so the event mapping never has to look at spreadsheet representations.

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{ImportError, ImportResult, RowError};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const TIME_FORMATS: &[&str] = &[
    "%H:%M",
    "%H:%M:%S",
    "%I:%M %p",
    "%I:%M:%S %p",
    "%I:%M%p",
    "PT%HH%MM%SS",
];

/// One event row with its cells already converted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    /// 1-based row number as shown by spreadsheet applications
    pub row_number: usize,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub calendar_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub start_time_zone: Option<String>,
    pub end_time_zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Summary,
    Description,
    Location,
    CalendarName,
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    StartTimeZone,
    EndTimeZone,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        let normalized = header.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalized.as_str() {
            "summary" => Some(Self::Summary),
            "description" => Some(Self::Description),
            "location" => Some(Self::Location),
            "calendar name" => Some(Self::CalendarName),
            "start date" => Some(Self::StartDate),
            "start time" => Some(Self::StartTime),
            "end date" => Some(Self::EndDate),
            "end time" => Some(Self::EndTime),
            "start time zone" => Some(Self::StartTimeZone),
            "end time zone" => Some(Self::EndTimeZone),
            _ => None,
        }
    }

    fn header(self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Description => "Description",
            Self::Location => "Location",
            Self::CalendarName => "Calendar Name",
            Self::StartDate => "Start Date",
            Self::StartTime => "Start Time",
            Self::EndDate => "End Date",
            Self::EndTime => "End Time",
            Self::StartTimeZone => "Start Time Zone",
            Self::EndTimeZone => "End Time Zone",
        }
    }
}

/// Open a workbook and read the event rows of `sheet`, or of the first sheet
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> ImportResult<Vec<SheetRow>> {
    let spreadsheet_error = |message: String| ImportError::Spreadsheet {
        path: path.display().to_string(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_error(e.to_string()))?;
    let sheet_names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(name) if sheet_names.iter().any(|s| s == name) => name.to_string(),
        Some(name) => {
            return Err(spreadsheet_error(format!(
                "no sheet named '{}' (available: {})",
                name,
                sheet_names.join(", ")
            )))
        }
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| spreadsheet_error("workbook contains no sheets".to_string()))?,
    };

    info!("Reading sheet '{}' from {}", sheet_name, path.display());
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| spreadsheet_error(e.to_string()))?;

    parse_rows(&range).map_err(|e| match e {
        ImportError::Spreadsheet { message, .. } => spreadsheet_error(message),
        other => other,
    })
}

/// Convert a cell range (header row first) into event rows
pub fn parse_rows(range: &Range<Data>) -> ImportResult<Vec<SheetRow>> {
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows();

    let header = rows.next().ok_or_else(|| ImportError::Spreadsheet {
        path: String::new(),
        message: "sheet is empty".to_string(),
    })?;

    let mut columns: HashMap<Column, usize> = HashMap::new();
    for (index, cell) in header.iter().enumerate() {
        let Some(text) = cell_text(cell) else { continue };
        match Column::from_header(&text) {
            Some(column) => {
                columns.entry(column).or_insert(index);
            }
            None => debug!("Ignoring unknown column '{}'", text),
        }
    }

    if !columns.contains_key(&Column::StartDate) {
        return Err(ImportError::Spreadsheet {
            path: String::new(),
            message: format!("header row has no '{}' column", Column::StartDate.header()),
        });
    }

    let mut parsed = Vec::new();
    let mut errors = Vec::new();

    for (offset, cells) in rows.enumerate() {
        // header is row `first_row + 1`, so the first data row is one below it
        let row_number = first_row + offset + 2;
        if cells.iter().all(is_blank) {
            continue;
        }

        let cell = |column: Column| columns.get(&column).and_then(|&index| cells.get(index));
        let text = |column: Column| cell(column).and_then(cell_text);
        let mut problems = Vec::new();
        let mut date = |column: Column| match cell(column).map(cell_date).transpose() {
            Ok(value) => value.flatten(),
            Err(message) => {
                problems.push(RowError::new(row_number, format!("{}: {}", column.header(), message)));
                None
            }
        };

        let start_date = date(Column::StartDate);
        let end_date = date(Column::EndDate);

        let mut time = |column: Column| match cell(column).map(cell_time).transpose() {
            Ok(value) => value.flatten(),
            Err(message) => {
                problems.push(RowError::new(row_number, format!("{}: {}", column.header(), message)));
                None
            }
        };

        let start_time = time(Column::StartTime);
        let end_time = time(Column::EndTime);

        if !problems.is_empty() {
            errors.extend(problems);
            continue;
        }

        parsed.push(SheetRow {
            row_number,
            summary: text(Column::Summary),
            description: text(Column::Description),
            location: text(Column::Location),
            calendar_name: text(Column::CalendarName),
            start_date,
            start_time,
            end_date,
            end_time,
            start_time_zone: text(Column::StartTimeZone),
            end_time_zone: text(Column::EndTimeZone),
        });
    }

    if !errors.is_empty() {
        return Err(ImportError::InvalidRows(errors));
    }

    debug!("Parsed {} event rows", parsed.len());
    Ok(parsed)
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Convert a spreadsheet date serial (1900 date system) into a date and time
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let days = serial.floor();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;

    epoch.checked_add_signed(Duration::days(days as i64) + Duration::seconds(seconds))
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())?.to_string(),
        Data::Error(e) => e.to_string(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn serial_of(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::DateTime(dt) => Some(dt.as_f64()),
        _ => None,
    }
}

fn cell_date(cell: &Data) -> Result<Option<NaiveDate>, String> {
    if is_blank(cell) {
        return Ok(None);
    }

    if let Some(serial) = serial_of(cell) {
        // whole days only, the time fraction must not round into the next day
        return excel_serial_to_datetime(serial.floor())
            .map(|dt| Some(dt.date()))
            .ok_or_else(|| format!("{} is not a valid date serial", serial));
    }

    match cell {
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s.trim())
            .map(Some)
            .ok_or_else(|| format!("cannot read '{}' as a date", s.trim())),
        other => Err(format!("unsupported cell value '{}' for a date", other)),
    }
}

fn cell_time(cell: &Data) -> Result<Option<NaiveTime>, String> {
    if is_blank(cell) {
        return Ok(None);
    }

    let time = if let Some(serial) = serial_of(cell) {
        excel_serial_to_datetime(serial)
            .map(|dt| dt.time())
            .ok_or_else(|| format!("{} is not a valid time serial", serial))?
    } else {
        match cell {
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => parse_time_text(s.trim())
                .ok_or_else(|| format!("cannot read '{}' as a time", s.trim()))?,
            other => return Err(format!("unsupported cell value '{}' for a time", other)),
        }
    };

    // events are scheduled to the minute
    Ok(NaiveTime::from_hms_opt(time.hour(), time.minute(), 0))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime_text(text).map(|dt| dt.date()))
}

fn parse_time_text(text: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime_text(text).map(|dt| dt.time()))
}

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

//! Turning a spreadsheet row into a calendar event payload.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::spreadsheet::SheetRow;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Start or end of an event: either a whole `date` or a local `dateTime` in `timeZone`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date.format("%Y-%m-%d").to_string()),
            date_time: None,
            time_zone: None,
        }
    }

    pub fn timed(date_time: NaiveDateTime, time_zone: &str) -> Self {
        Self {
            date: None,
            date_time: Some(date_time.format(DATE_TIME_FORMAT).to_string()),
            time_zone: Some(time_zone.to_string()),
        }
    }
}

/// Request body for creating an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

fn parse_zone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("'{}' is not a known time zone", name))
}

/// Local wall time as an instant. Times skipped by a DST transition are read
/// with the offset in force before the gap.
fn to_instant(local: NaiveDateTime, zone: Tz) -> DateTime<Tz> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before_gap = zone
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix()
                .local_minus_utc();
            zone.from_utc_datetime(&(local - Duration::seconds(i64::from(before_gap))))
        }
    }
}

/// Work out start and end of the event described by `row`.
///
/// Rows without a start time become all-day events ending on the end date (or
/// the start date); Google treats all-day end dates as exclusive, so the payload
/// carries the day after. Timed rows without an end time last `default_duration`;
/// an end time without an end date ends on the start date.
pub fn event_times(
    row: &SheetRow,
    default_timezone: &str,
    default_duration: Duration,
) -> Result<(EventDateTime, EventDateTime), String> {
    let start_date = row
        .start_date
        .ok_or_else(|| "Event must contain a Start Date".to_string())?;

    let Some(start_time) = row.start_time else {
        let last_day = row.end_date.unwrap_or(start_date);
        if last_day < start_date {
            return Err(format!("End Date {} is before Start Date {}", last_day, start_date));
        }
        let end = last_day
            .succ_opt()
            .ok_or_else(|| format!("End Date {} is out of range", last_day))?;
        return Ok((EventDateTime::all_day(start_date), EventDateTime::all_day(end)));
    };

    let start_zone_name = row.start_time_zone.as_deref().unwrap_or(default_timezone);
    let end_zone_name = row.end_time_zone.as_deref().unwrap_or(default_timezone);
    let start_zone = parse_zone(start_zone_name)?;
    let end_zone = parse_zone(end_zone_name)?;

    let start = start_date.and_time(start_time);
    let end = match (row.end_date, row.end_time) {
        (_, None) => start + default_duration,
        (None, Some(end_time)) => start_date.and_time(end_time),
        (Some(end_date), Some(end_time)) => end_date.and_time(end_time),
    };

    if to_instant(end, end_zone) < to_instant(start, start_zone) {
        return Err(format!("event ends ({}) before it starts ({})", end, start));
    }

    Ok((
        EventDateTime::timed(start, start_zone_name),
        EventDateTime::timed(end, end_zone_name),
    ))
}

/// Build the full event payload for `row`
pub fn build_event(
    row: &SheetRow,
    default_timezone: &str,
    default_duration: Duration,
) -> Result<NewEvent, String> {
    let (start, end) = event_times(row, default_timezone, default_duration)?;

    Ok(NewEvent {
        summary: row.summary.clone(),
        description: row.description.clone().unwrap_or_default(),
        location: row.location.clone(),
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn time(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    fn hour() -> Duration {
        Duration::hours(1)
    }

    #[test]
    fn test_missing_start_date() {
        let row = SheetRow {
            row_number: 2,
            summary: Some("Nothing".into()),
            ..Default::default()
        };
        assert_eq!(
            event_times(&row, "UTC", hour()).unwrap_err(),
            "Event must contain a Start Date"
        );
    }

    #[test]
    fn test_single_all_day_event() {
        let row = SheetRow {
            start_date: date(2024, 3, 5),
            ..Default::default()
        };
        let (start, end) = event_times(&row, "UTC", hour()).unwrap();
        assert_eq!(start, EventDateTime::all_day(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        assert_eq!(end.date.as_deref(), Some("2024-03-06"));
        assert_eq!(end.time_zone, None);
    }

    #[test]
    fn test_multi_day_all_day_event() {
        let row = SheetRow {
            start_date: date(2024, 2, 28),
            end_date: date(2024, 3, 1),
            ..Default::default()
        };
        let (start, end) = event_times(&row, "UTC", hour()).unwrap();
        assert_eq!(start.date.as_deref(), Some("2024-02-28"));
        assert_eq!(end.date.as_deref(), Some("2024-03-02"));
    }

    #[test]
    fn test_timed_event_defaults_to_one_hour_in_default_zone() {
        let row = SheetRow {
            start_date: date(2024, 3, 5),
            start_time: time(23, 30),
            ..Default::default()
        };
        let (start, end) = event_times(&row, "America/New_York", hour()).unwrap();
        assert_eq!(start.date_time.as_deref(), Some("2024-03-05T23:30:00"));
        assert_eq!(start.time_zone.as_deref(), Some("America/New_York"));
        assert_eq!(end.date_time.as_deref(), Some("2024-03-06T00:30:00"));
        assert_eq!(end.time_zone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn test_end_time_without_end_date_ends_same_day() {
        let row = SheetRow {
            start_date: date(2024, 3, 5),
            start_time: time(9, 0),
            end_time: time(17, 15),
            ..Default::default()
        };
        let (_, end) = event_times(&row, "UTC", hour()).unwrap();
        assert_eq!(end.date_time.as_deref(), Some("2024-03-05T17:15:00"));
    }

    #[test]
    fn test_timed_event_across_days_and_zones() {
        let row = SheetRow {
            start_date: date(2024, 6, 1),
            start_time: time(18, 0),
            end_date: date(2024, 6, 2),
            end_time: time(7, 45),
            start_time_zone: Some("America/Los_Angeles".into()),
            end_time_zone: Some("Europe/London".into()),
            ..Default::default()
        };
        let (start, end) = event_times(&row, "UTC", hour()).unwrap();
        assert_eq!(start.time_zone.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(end.date_time.as_deref(), Some("2024-06-02T07:45:00"));
        assert_eq!(end.time_zone.as_deref(), Some("Europe/London"));
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let row = SheetRow {
            start_date: date(2024, 3, 5),
            start_time: time(9, 0),
            end_time: time(8, 0),
            ..Default::default()
        };
        assert!(event_times(&row, "UTC", hour()).is_err());

        let all_day = SheetRow {
            start_date: date(2024, 3, 5),
            end_date: date(2024, 3, 4),
            ..Default::default()
        };
        assert!(event_times(&all_day, "UTC", hour()).is_err());
    }

    #[test]
    fn test_times_skipped_by_dst_are_accepted() {
        // 2024-03-10 02:00-03:00 does not exist in New York
        let in_gap = SheetRow {
            start_date: date(2024, 3, 10),
            start_time: time(2, 30),
            ..Default::default()
        };
        let (start, end) = event_times(&in_gap, "America/New_York", hour()).unwrap();
        assert_eq!(start.date_time.as_deref(), Some("2024-03-10T02:30:00"));
        assert_eq!(end.date_time.as_deref(), Some("2024-03-10T03:30:00"));

        let ends_in_gap = SheetRow {
            start_date: date(2024, 3, 10),
            start_time: time(1, 30),
            ..Default::default()
        };
        let (_, end) = event_times(&ends_in_gap, "America/New_York", hour()).unwrap();
        assert_eq!(end.date_time.as_deref(), Some("2024-03-10T02:30:00"));

        let reversed = SheetRow {
            start_date: date(2024, 3, 10),
            start_time: time(2, 30),
            end_time: time(1, 0),
            ..Default::default()
        };
        assert!(event_times(&reversed, "America/New_York", hour()).is_err());
    }

    #[test]
    fn test_unknown_zone_is_rejected() {
        let row = SheetRow {
            start_date: date(2024, 3, 5),
            start_time: time(9, 0),
            start_time_zone: Some("Eastern".into()),
            ..Default::default()
        };
        let err = event_times(&row, "UTC", hour()).unwrap_err();
        assert!(err.contains("Eastern"));
    }

    #[test]
    fn test_payload_serializes_like_the_api_expects() {
        let row = SheetRow {
            summary: Some("Standup".into()),
            start_date: date(2024, 3, 5),
            start_time: time(9, 0),
            ..Default::default()
        };
        let event = build_event(&row, "Europe/Paris", Duration::minutes(15)).unwrap();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "summary": "Standup",
                "description": "",
                "start": {"dateTime": "2024-03-05T09:00:00", "timeZone": "Europe/Paris"},
                "end": {"dateTime": "2024-03-05T09:15:00", "timeZone": "Europe/Paris"}
            })
        );
    }
}

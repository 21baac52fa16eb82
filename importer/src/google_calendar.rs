use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::ImportResult;
use crate::event::NewEvent;
use crate::google_auth::GoogleAuth;
use crate::http_utils::{handle_google_api_response, parse_json_response};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// One entry of the user's calendar list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub access_role: String,
    #[serde(default)]
    pub primary: bool,
}

impl CalendarListEntry {
    /// Only owners and writers may insert events
    pub fn is_writable(&self) -> bool {
        matches!(self.access_role.as_str(), "owner" | "writer")
    }
}

/// The parts of an inserted event we report back to the user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Start and title of an existing event
#[derive(Debug, Clone)]
pub struct EventSummary {
    pub start: String,
    pub summary: String,
}

/// The calendar operations the importer needs
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// The account's default time zone
    async fn default_timezone(&self) -> ImportResult<String>;

    /// Every calendar linked to the account
    async fn list_calendars(&self) -> ImportResult<Vec<CalendarListEntry>>;

    /// Create one event
    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> ImportResult<CreatedEvent>;

    /// The next `max_results` events starting from now
    async fn upcoming_events(&self, calendar_id: &str, max_results: u32) -> ImportResult<Vec<EventSummary>>;
}

#[derive(Debug, Deserialize)]
struct SettingResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListPage {
    items: Option<Vec<CalendarListEntry>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    items: Option<Vec<GoogleEvent>>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    summary: Option<String>,
    start: Option<GoogleEventDateTime>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

/// Google Calendar v3 over its REST API
pub struct GoogleCalendarService {
    auth: GoogleAuth,
    http_client: reqwest::Client,
}

impl GoogleCalendarService {
    pub fn new(auth: GoogleAuth) -> Self {
        Self {
            auth,
            http_client: reqwest::Client::new(),
        }
    }
}

fn calendar_url(calendar_id: &str) -> String {
    format!(
        "{}/calendars/{}/events",
        API_BASE,
        urlencoding::encode(calendar_id)
    )
}

#[async_trait]
impl CalendarApi for GoogleCalendarService {
    async fn default_timezone(&self) -> ImportResult<String> {
        let token = self.auth.access_token().await?;

        let response = self
            .http_client
            .get(format!("{}/users/me/settings/timezone", API_BASE))
            .bearer_auth(&token)
            .send()
            .await?;

        let response = handle_google_api_response(response).await?;
        let setting: SettingResponse = parse_json_response(response, "Google Calendar timezone setting").await?;

        debug!("Account default time zone: {}", setting.value);
        Ok(setting.value)
    }

    async fn list_calendars(&self) -> ImportResult<Vec<CalendarListEntry>> {
        let token = self.auth.access_token().await?;
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(format!("{}/users/me/calendarList", API_BASE))
                .bearer_auth(&token);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page)]);
            }

            let response = handle_google_api_response(request.send().await?).await?;
            let page: CalendarListPage = parse_json_response(response, "Google Calendar list response").await?;

            calendars.extend(page.items.unwrap_or_default());
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!("Found {} linked calendars", calendars.len());
        Ok(calendars)
    }

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> ImportResult<CreatedEvent> {
        let token = self.auth.access_token().await?;

        let response = self
            .http_client
            .post(calendar_url(calendar_id))
            .bearer_auth(&token)
            .json(event)
            .send()
            .await?;

        let response = handle_google_api_response(response).await?;
        let created: CreatedEvent = parse_json_response(response, "Google Calendar insert response").await?;

        info!("Created event {} in calendar {}", created.id, calendar_id);
        Ok(created)
    }

    async fn upcoming_events(&self, calendar_id: &str, max_results: u32) -> ImportResult<Vec<EventSummary>> {
        let token = self.auth.access_token().await?;

        let response = self
            .http_client
            .get(calendar_url(calendar_id))
            .bearer_auth(&token)
            .query(&[
                ("timeMin", Utc::now().to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        let response = handle_google_api_response(response).await?;
        let events: GoogleEventsResponse = parse_json_response(response, "Google Calendar events response").await?;

        Ok(events
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|event| EventSummary {
                start: event
                    .start
                    .and_then(|start| start.date_time.or(start.date))
                    .unwrap_or_default(),
                summary: event.summary.unwrap_or_default(),
            })
            .collect())
    }
}

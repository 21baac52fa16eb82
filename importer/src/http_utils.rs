//! HTTP utility functions for consistent error handling across the Google clients

use reqwest::Response;
use serde::Deserialize;
use tracing::warn;

use crate::errors::{ImportError, ImportResult};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: Option<String>,
}

/// Pull the human readable message out of a Google JSON error body, if there is one
pub fn google_error_message(body: &str) -> String {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Handle Google API response errors with consistent logging and error formatting
pub async fn handle_google_api_response(response: Response) -> ImportResult<Response> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        warn!("Google Calendar API error: {} - {}", status, error_text);
        return Err(ImportError::Api {
            service: "Google Calendar".to_string(),
            message: format!("{} - {}", status, google_error_message(&error_text)),
        });
    }
    Ok(response)
}

/// Handle OAuth2 response errors and return response text for debugging
pub async fn handle_oauth2_response_with_text(response: Response) -> ImportResult<String> {
    let status = response.status();
    let response_text = response.text().await?;

    if !status.is_success() {
        return Err(ImportError::Authentication {
            service: "Google OAuth2".to_string(),
            message: format!("{} - {}", status, response_text.trim()),
        });
    }

    Ok(response_text)
}

/// Parse JSON response with consistent error handling
pub async fn parse_json_response<T>(response: Response, context: &str) -> ImportResult<T>
where
    T: serde::de::DeserializeOwned,
{
    response.json().await.map_err(|e| ImportError::Parsing {
        format: context.to_string(),
        message: e.to_string(),
    })
}

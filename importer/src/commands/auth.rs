use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{self, Write};
use tracing::info;

use super::{Command, CommandContext};
use crate::google_auth::{extract_authorization_code, GoogleAuth};
use crate::google_calendar::CalendarApi;

/// Command to set up (or verify) Google Calendar authentication
pub struct AuthCommand;

/// Make sure a usable token exists, walking the user through consent if not
pub async fn ensure_authenticated(auth: &GoogleAuth) -> Result<()> {
    if auth.is_authenticated().await {
        return Ok(());
    }

    info!("No usable Google Calendar token found, starting authorization");
    let request = auth.authorization_request()?;

    println!("🔐 Google Calendar authorization required");
    println!("\n1. Open this URL in your browser:");
    println!("   {}", request.url);
    println!("\n2. Grant access to your Google Calendar");
    println!("3. Your browser is sent to a localhost page that may not load;");
    println!("   copy that page's full address (or just its 'code' value)");

    print!("\n🔑 Paste it here: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let code = extract_authorization_code(&input, &request.csrf_state)?;
    auth.authenticate_with_code(&code)
        .await
        .context("Failed to exchange authorization code")?;

    println!("✅ Google Calendar authorization successful");
    Ok(())
}

#[async_trait]
impl Command for AuthCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let service = context.calendar_service().await?;
        println!("✅ Authenticated with Google Calendar");

        let timezone = service.default_timezone().await?;
        println!("🌍 Default time zone: {}", timezone);

        let calendars = service.list_calendars().await?;
        println!("\n📅 Calendars you can add events to:");
        for calendar in calendars.iter().filter(|c| c.is_writable()) {
            let marker = if calendar.primary { " (Primary)" } else { "" };
            println!("   {}{}", calendar.summary, marker);
        }

        Ok(())
    }
}

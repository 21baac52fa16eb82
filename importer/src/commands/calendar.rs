use anyhow::Result;
use async_trait::async_trait;

use super::{Command, CommandContext};
use crate::google_calendar::CalendarApi;

/// Command to print every calendar linked to the account
pub struct ListCalendarsCommand;

/// Command to print the next few events of a calendar
pub struct UpcomingCommand {
    pub count: u32,
    pub calendar_id: String,
}

#[async_trait]
impl Command for ListCalendarsCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let service = context.calendar_service().await?;

        println!("Getting list of calendars");
        let calendars = service.list_calendars().await?;

        if calendars.is_empty() {
            println!("No calendars found.");
        }
        for calendar in calendars {
            let primary = if calendar.primary { "Primary" } else { "" };
            println!(
                "{}\t{}\t{}\t{}",
                calendar.summary, calendar.id, calendar.access_role, primary
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Command for UpcomingCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let service = context.calendar_service().await?;

        println!("Getting the upcoming {} events", self.count);
        let events = service.upcoming_events(&self.calendar_id, self.count).await?;

        if events.is_empty() {
            println!("No upcoming events found.");
            return Ok(());
        }

        for event in events {
            println!("{} {}", event.start, event.summary);
        }

        Ok(())
    }
}

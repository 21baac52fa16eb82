use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::google_auth::GoogleAuth;
use crate::google_calendar::GoogleCalendarService;

pub mod auth;
pub mod calendar;
pub mod import;

/// Trait for all command implementations
#[async_trait]
pub trait Command {
    /// Execute the command with the provided context
    async fn execute(&mut self, context: &CommandContext) -> Result<()>;
}

/// Shared context for all commands
pub struct CommandContext {
    pub config: Arc<RwLock<Config>>,
    pub debug: bool,
}

impl CommandContext {
    pub fn new(config: Arc<RwLock<Config>>, debug: bool) -> Self {
        Self { config, debug }
    }

    /// Build an authenticated calendar client, running the OAuth flow when needed
    pub async fn calendar_service(&self) -> Result<GoogleCalendarService> {
        let google_config = self.config.read().google.clone();

        let auth = GoogleAuth::from_config(&google_config)
            .await
            .with_context(|| {
                format!(
                    "Failed to load OAuth client secrets from {}",
                    google_config.credentials_path.display()
                )
            })?;

        auth::ensure_authenticated(&auth).await?;
        Ok(GoogleCalendarService::new(auth))
    }
}

//! Command routing and the reminder dispatcher
//!
//! The bot is a thin layer over the wizard engine: it maps slash commands
//! to flow entry points and periodically fires drink prompts for users
//! whose schedule has a slot matching the current minute in their
//! timezone. A command always wins over an in-flight wizard.

use crate::config::Config;
use crate::error::Result;
use crate::profile::{Profile, ProfileStore};
use crate::prompts;
use crate::resolver::LocationResolver;
use crate::schedule;
use crate::session::{FlowMode, SessionStore};
use crate::transport::{Event, Transport};
use crate::wizard::WizardEngine;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
    AddParameters,
    EditParameters,
    DeleteParameters,
    InfoParameters,
    Drink,
    Time,
    Stop,
    Continue,
}

impl Command {
    /// Parse a leading-slash command, tolerating the `@botname` suffix
    /// Telegram appends in group chats.
    fn parse(text: &str) -> Option<Self> {
        let stripped = text.trim().strip_prefix('/')?;
        let name = stripped
            .split(|c: char| c.is_whitespace() || c == '@')
            .next()
            .unwrap_or("");
        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "add_parameters" => Some(Command::AddParameters),
            "edit_parameters" => Some(Command::EditParameters),
            "delete_parameters" => Some(Command::DeleteParameters),
            "info_parameters" => Some(Command::InfoParameters),
            "drink" => Some(Command::Drink),
            "time" => Some(Command::Time),
            "stop" => Some(Command::Stop),
            "continue" => Some(Command::Continue),
            _ => None,
        }
    }
}

pub struct Bot<T, S, P, R>
where
    T: Transport,
    S: SessionStore,
    P: ProfileStore,
    R: LocationResolver,
{
    transport: Arc<T>,
    sessions: Arc<S>,
    profiles: Arc<P>,
    engine: WizardEngine<T, S, P, R>,
}

impl<T, S, P, R> Bot<T, S, P, R>
where
    T: Transport,
    S: SessionStore,
    P: ProfileStore,
    R: LocationResolver,
{
    pub fn new(
        transport: Arc<T>,
        sessions: Arc<S>,
        profiles: Arc<P>,
        resolver: Arc<R>,
        config: Config,
    ) -> Self {
        let engine = WizardEngine::new(
            Arc::clone(&transport),
            Arc::clone(&sessions),
            Arc::clone(&profiles),
            resolver,
            config,
        );
        Self {
            transport,
            sessions,
            profiles,
            engine,
        }
    }

    /// Handle one inbound event, logging and swallowing any failure so a
    /// single bad update never takes the poll loop down.
    pub async fn process_event(&self, event: Event) {
        let user = match &event {
            Event::Text { user, .. } | Event::Button { user, .. } => *user,
        };
        if let Err(e) = self.handle_event(event).await {
            error!("Failed to handle event from user {}: {}", user, e);
        }
    }

    async fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::Text {
                user,
                message_id,
                text,
            } => {
                if text.trim().starts_with('/') {
                    return match Command::parse(&text) {
                        Some(command) => self.handle_command(user, command).await,
                        None => {
                            // unknown commands still win over an in-flight flow
                            self.engine.abort_for_command(user).await?;
                            self.transport.send_text(user, prompts::HELP, None).await?;
                            Ok(())
                        }
                    };
                }
                self.engine.handle_text(user, message_id, &text).await
            }
            Event::Button { user, data, .. } => self.engine.handle_button(user, data).await,
        }
    }

    async fn handle_command(&self, user: i64, command: Command) -> Result<()> {
        debug!("User {} sent {:?}", user, command);
        // A command aborts whatever flow was in flight.
        self.engine.abort_for_command(user).await?;

        match command {
            Command::Start => {
                self.transport.send_text(user, prompts::START, None).await?;
                Ok(())
            }
            Command::Help => {
                self.transport.send_text(user, prompts::HELP, None).await?;
                Ok(())
            }
            Command::AddParameters => self.engine.begin(user, FlowMode::Add).await,
            Command::EditParameters => self.engine.begin(user, FlowMode::Edit).await,
            Command::DeleteParameters => self.engine.begin_delete(user).await,
            Command::InfoParameters => self.send_profile_info(user).await,
            Command::Drink => self.engine.begin_drink(user).await,
            Command::Time => self.send_next_reminder(user).await,
            Command::Stop => self.engine.begin_stop(user).await,
            Command::Continue => self.engine.continue_notifications(user).await,
        }
    }

    async fn send_profile_info(&self, user: i64) -> Result<()> {
        let text = match self.profiles.get(user).await? {
            Some(profile) => prompts::profile_info(&profile),
            None => prompts::NO_PROFILE.to_string(),
        };
        self.transport.send_text(user, &text, None).await?;
        Ok(())
    }

    async fn send_next_reminder(&self, user: i64) -> Result<()> {
        let profile = match self.profiles.get(user).await? {
            Some(p) => p,
            None => {
                self.transport.send_text(user, prompts::NO_PROFILE, None).await?;
                return Ok(());
            }
        };

        let next = match local_now(&profile) {
            Some(now) => {
                let reminders = self.ensure_schedule(&profile).await?;
                schedule::next_reminder(&reminders, &now)
            }
            None => None,
        };
        self.transport
            .send_text(user, &prompts::next_reminder_at(next.as_deref()), None)
            .await?;
        Ok(())
    }

    /// One dispatcher tick: fire a drink prompt for every user whose
    /// schedule has a slot equal to the current minute in their timezone.
    pub async fn dispatch_due_reminders(&self) -> Result<()> {
        for profile in self.profiles.list_all().await? {
            let now = match local_now(&profile) {
                Some(now) => now,
                None => {
                    warn!(
                        "User {} has unparseable timezone '{}'",
                        profile.user_id, profile.timezone
                    );
                    continue;
                }
            };
            if let Err(e) = self.fire_if_due(&profile, &now).await {
                error!("Reminder dispatch failed for user {}: {}", profile.user_id, e);
            }
        }
        Ok(())
    }

    async fn fire_if_due(&self, profile: &Profile, now: &str) -> Result<()> {
        if profile.mute {
            return Ok(());
        }
        // An unanswered drink prompt means the user is already being nagged.
        if self.sessions.is_queued(profile.user_id).await? {
            return Ok(());
        }
        // Never interrupt an in-flight wizard with a reminder.
        if self.sessions.get_session(profile.user_id).await?.is_some() {
            return Ok(());
        }

        let reminders = self.ensure_schedule(profile).await?;
        if !reminders.iter().any(|slot| slot == now) {
            return Ok(());
        }

        self.sessions
            .set_pending_reminder(profile.user_id, now)
            .await?;
        self.engine.begin_drink(profile.user_id).await
    }

    /// Load the user's schedule, regenerating it from the profile when the
    /// session store lost it (e.g. after a restart).
    async fn ensure_schedule(&self, profile: &Profile) -> Result<Vec<String>> {
        if let Some(reminders) = self.sessions.get_schedule(profile.user_id).await? {
            return Ok(reminders);
        }
        let reminders = schedule::generate(&profile.time.0, &profile.time.1, profile.goal)?;
        self.sessions
            .put_schedule(profile.user_id, &reminders)
            .await?;
        debug!(
            "Regenerated schedule for user {} ({} slots)",
            profile.user_id,
            reminders.len()
        );
        Ok(reminders)
    }
}

/// Current wall-clock minute in the profile's timezone, as HH:MM
fn local_now(profile: &Profile) -> Option<String> {
    let tz: Tz = profile.timezone.parse().ok()?;
    Some(Utc::now().with_timezone(&tz).format("%H:%M").to_string())
}

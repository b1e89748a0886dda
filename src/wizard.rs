//! Wizard engine
//!
//! Drives the WEIGHT -> CITY -> TIME parameter wizard and the single-step
//! flows (delete, stop, drink logging). All state lives in the session
//! store, so a wizard survives process restarts and resumes at the same
//! stage. Transport edits and deletes are best-effort: a message the user
//! already removed must never fail a wizard step.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::profile::{Profile, ProfilePatch, ProfileStore};
use crate::prompts;
use crate::resolver::LocationResolver;
use crate::schedule;
use crate::session::{Draft, FlowMode, Session, SessionStore, Stage};
use crate::tracker::MessageTracker;
use crate::transport::{Button, CallbackData, Keyboard, Transport};
use crate::validate;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct WizardEngine<T, S, P, R>
where
    T: Transport,
    S: SessionStore,
    P: ProfileStore,
    R: LocationResolver,
{
    transport: Arc<T>,
    sessions: Arc<S>,
    profiles: Arc<P>,
    resolver: Arc<R>,
    tracker: MessageTracker<S>,
    config: Config,
}

fn wizard_keyboard(mode: FlowMode) -> Keyboard {
    let mut kb = Keyboard::default();
    if mode == FlowMode::Edit {
        kb = kb.row(vec![Button::new(prompts::SKIP_BUTTON, CallbackData::Skip)]);
    }
    kb.row(vec![Button::new(prompts::CANCEL_BUTTON, CallbackData::Cancel)])
}

fn confirm_keyboard() -> Keyboard {
    Keyboard::default().row(vec![Button::new(prompts::CANCEL_BUTTON, CallbackData::Cancel)])
}

fn drink_keyboard() -> Keyboard {
    Keyboard::default()
        .row(vec![
            Button::new("200 ml", CallbackData::Drank(200)),
            Button::new("250 ml", CallbackData::Drank(250)),
            Button::new("300 ml", CallbackData::Drank(300)),
        ])
        .row(vec![
            Button::new("350 ml", CallbackData::Drank(350)),
            Button::new("400 ml", CallbackData::Drank(400)),
        ])
        .row(vec![Button::new(prompts::CHOICE_BUTTON, CallbackData::Choice)])
        .row(vec![Button::new(prompts::SNOOZE_BUTTON, CallbackData::Snooze)])
}

fn drink_choice_keyboard() -> Keyboard {
    Keyboard::default()
        .row(vec![Button::new(prompts::SNOOZE_BUTTON, CallbackData::Snooze)])
        .row(vec![Button::new(prompts::CANCEL_BUTTON, CallbackData::Cancel)])
}

fn keyboard_for(stage: Stage, mode: FlowMode) -> Keyboard {
    match stage {
        Stage::Weight | Stage::City | Stage::Time => wizard_keyboard(mode),
        Stage::Delete | Stage::Stop => confirm_keyboard(),
        Stage::Drink => drink_keyboard(),
        Stage::DrinkChoice => drink_choice_keyboard(),
    }
}

impl<T, S, P, R> WizardEngine<T, S, P, R>
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
        let tracker = MessageTracker::new(Arc::clone(&sessions));
        Self {
            transport,
            sessions,
            profiles,
            resolver,
            tracker,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Flow entry points
    // ------------------------------------------------------------------

    /// Start the parameters wizard. Silent no-op when a session is already
    /// active, when ADD finds an existing profile, or when EDIT finds none.
    pub async fn begin(&self, user: i64, mode: FlowMode) -> Result<()> {
        if !self.can_begin(user).await? {
            return Ok(());
        }
        let has_profile = self.profiles.get(user).await?.is_some();
        match mode {
            FlowMode::Add if has_profile => return Ok(()),
            FlowMode::Edit if !has_profile => return Ok(()),
            _ => {}
        }

        info!("User {} starting {:?} parameters wizard", user, mode);
        self.enter_stage(user, Session::new(Stage::Weight, mode)).await
    }

    /// Start the delete-confirmation flow
    pub async fn begin_delete(&self, user: i64) -> Result<()> {
        if !self.can_begin(user).await? || self.profiles.get(user).await?.is_none() {
            return Ok(());
        }
        self.enter_stage(user, Session::new(Stage::Delete, FlowMode::Add)).await
    }

    /// Start the stop-confirmation flow
    pub async fn begin_stop(&self, user: i64) -> Result<()> {
        if !self.can_begin(user).await? || self.profiles.get(user).await?.is_none() {
            return Ok(());
        }
        self.enter_stage(user, Session::new(Stage::Stop, FlowMode::Add)).await
    }

    /// Unmute reminders; immediate, no confirmation step
    pub async fn continue_notifications(&self, user: i64) -> Result<()> {
        if self.sessions.is_queued(user).await? {
            return Ok(());
        }
        let patch = ProfilePatch {
            mute: Some(false),
            ..Default::default()
        };
        match self.profiles.update(user, &patch).await {
            Ok(_) => {
                self.transport.send_text(user, prompts::CONTINUED, None).await?;
            }
            Err(Error::ProfileNotFound(_)) => {
                self.transport.send_text(user, prompts::NO_PROFILE, None).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Open the drink-logging prompt. No-op if one is already open.
    pub async fn begin_drink(&self, user: i64) -> Result<()> {
        if let Some(session) = self.sessions.get_session(user).await? {
            if matches!(session.stage, Stage::Drink | Stage::DrinkChoice) {
                return Ok(());
            }
        }
        self.sessions.add_queued(user).await?;
        self.enter_stage(user, Session::new(Stage::Drink, FlowMode::Add)).await
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Route a text message to the handler for the user's current stage.
    pub async fn handle_text(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        let session = match self.sessions.get_session(user).await? {
            Some(s) => s,
            None => {
                // Stray text outside any flow: remove it to keep the chat tidy
                let _ = self.transport.delete_message(user, message_id).await;
                return Ok(());
            }
        };

        match session.stage {
            Stage::Weight => self.handle_weight(user, message_id, text, session).await,
            Stage::City => self.handle_city(user, message_id, text, session).await,
            Stage::Time => self.handle_time(user, message_id, text, session).await,
            Stage::Delete => self.handle_delete(user, message_id, text).await,
            Stage::Stop => self.handle_stop(user, message_id, text).await,
            Stage::Drink | Stage::DrinkChoice => {
                self.handle_drink_text(user, message_id, text).await
            }
        }
    }

    /// Route a button click
    pub async fn handle_button(&self, user: i64, data: CallbackData) -> Result<()> {
        let session = match self.sessions.get_session(user).await? {
            Some(s) => s,
            None => return Ok(()),
        };

        match data {
            CallbackData::Cancel => self.cancel(user).await,
            CallbackData::Snooze => self.snooze(user, session).await,
            CallbackData::Drank(ml) => self.record_quick_volume(user, session, ml).await,
            CallbackData::Choice => self.switch_to_choice(user, session).await,
            CallbackData::Skip => self.skip_stage(user, session).await,
        }
    }

    /// Abort any active flow from any stage. Idempotent: cancelling with no
    /// active session sends nothing, but still clears any flow residue
    /// (tracked messages, the queued flag) so an expired session cannot
    /// leave the user blocked.
    pub async fn cancel(&self, user: i64) -> Result<()> {
        if self.sessions.get_session(user).await?.is_some() {
            let tracked = self.tracker.get(user).await?;
            if let Some(prompt_id) = tracked.prompt {
                // Best-effort: the prompt may already be gone
                let _ = self
                    .transport
                    .edit_text(user, prompt_id, prompts::CANCELLED)
                    .await;
            }
            if let Some(error_id) = tracked.error {
                let _ = self.transport.delete_message(user, error_id).await;
            }
        }

        self.clear_flow_state(user).await
    }

    /// A command arrived mid-wizard: the command wins and the wizard aborts.
    pub async fn abort_for_command(&self, user: i64) -> Result<()> {
        self.cancel(user).await
    }

    // ------------------------------------------------------------------
    // Parameter stages
    // ------------------------------------------------------------------

    async fn handle_weight(
        &self,
        user: i64,
        message_id: i64,
        text: &str,
        mut session: Session,
    ) -> Result<()> {
        self.reissue_prompt(user, Stage::Weight, session.mode).await?;

        let weight = match validate::parse_weight(text) {
            Some(w) => w,
            None => return self.reject_input(user, message_id, Stage::Weight, session.mode).await,
        };

        session.draft.weight = Some(weight);
        session.draft.goal = Some(validate::daily_goal(weight));
        self.advance(user, session, Stage::City).await
    }

    async fn handle_city(
        &self,
        user: i64,
        message_id: i64,
        text: &str,
        mut session: Session,
    ) -> Result<()> {
        self.reissue_prompt(user, Stage::City, session.mode).await?;

        let city = match validate::parse_city(text, self.config.city_min_len, self.config.city_max_len)
        {
            Some(c) => c,
            None => return self.reject_input(user, message_id, Stage::City, session.mode).await,
        };

        // A lexically valid city that resolves to nothing takes the same
        // error path as malformed input.
        let timezone = match self.resolver.resolve_timezone(&city).await? {
            Some(tz) => tz,
            None => {
                debug!("City '{}' did not resolve to a timezone", city);
                return self.reject_input(user, message_id, Stage::City, session.mode).await;
            }
        };

        session.draft.city = Some(city);
        session.draft.timezone = Some(timezone);
        self.advance(user, session, Stage::Time).await
    }

    async fn handle_time(
        &self,
        user: i64,
        message_id: i64,
        text: &str,
        mut session: Session,
    ) -> Result<()> {
        self.reissue_prompt(user, Stage::Time, session.mode).await?;

        let time = match validate::parse_time_range(text) {
            Some(t) => t,
            None => return self.reject_input(user, message_id, Stage::Time, session.mode).await,
        };

        self.drop_error(user).await?;
        session.draft.time = Some(time);
        self.commit(user, session).await
    }

    /// Terminal step: write the profile, regenerate the schedule, then
    /// clear the session. A crash between the profile write and the session
    /// delete leaves a dangling session that self-heals on the next input.
    async fn commit(&self, user: i64, session: Session) -> Result<()> {
        let profile = match self.build_profile(user, &session).await {
            Ok(p) => p,
            Err(Error::IncompleteDraft(_)) => {
                warn!("User {} reached commit with an incomplete draft", user);
                self.clear_flow_state(user).await?;
                self.transport.send_text(user, prompts::GENERIC_ERROR, None).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let reminders = schedule::generate(&profile.time.0, &profile.time.1, profile.goal)?;
        self.sessions.put_schedule(user, &reminders).await?;

        self.clear_flow_state(user).await?;

        info!(
            "User {} committed profile: goal {} l, {} reminders",
            user,
            profile.goal,
            reminders.len()
        );
        self.transport
            .send_text(user, &prompts::commit_summary(&profile), None)
            .await?;
        Ok(())
    }

    async fn build_profile(&self, user: i64, session: &Session) -> Result<Profile> {
        let draft = &session.draft;
        match session.mode {
            FlowMode::Edit => {
                let patch = ProfilePatch {
                    weight: draft.weight,
                    city: draft.city.clone(),
                    timezone: draft.timezone.clone(),
                    time: draft.time.clone(),
                    goal: draft.goal,
                    mute: None,
                };
                self.profiles.update(user, &patch).await
            }
            FlowMode::Add => {
                let profile = match draft {
                    Draft {
                        weight: Some(weight),
                        city: Some(city),
                        timezone: Some(timezone),
                        time: Some(time),
                        goal: Some(goal),
                        ..
                    } => Profile {
                        user_id: user,
                        weight: *weight,
                        city: city.clone(),
                        timezone: timezone.clone(),
                        time: time.clone(),
                        goal: *goal,
                        mute: false,
                    },
                    _ => return Err(Error::IncompleteDraft(user)),
                };
                self.profiles.create(&profile).await?;
                Ok(profile)
            }
        }
    }

    /// Skip button in the edit wizard: keep the stored value and move on.
    async fn skip_stage(&self, user: i64, session: Session) -> Result<()> {
        if session.mode != FlowMode::Edit {
            return Ok(());
        }
        match session.stage {
            Stage::Weight => self.advance(user, session, Stage::City).await,
            Stage::City => self.advance(user, session, Stage::Time).await,
            Stage::Time => {
                self.drop_error(user).await?;
                self.commit(user, session).await
            }
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Confirmation flows
    // ------------------------------------------------------------------

    async fn handle_delete(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        if text.trim() != prompts::DELETE_CONFIRM_WORD {
            let _ = self.transport.delete_message(user, message_id).await;
            return Ok(());
        }

        self.profiles.delete(user).await?;
        self.sessions.delete_schedule(user).await?;
        self.clear_flow_state(user).await?;

        info!("User {} deleted their profile", user);
        self.transport.send_text(user, prompts::DELETED, None).await?;
        Ok(())
    }

    async fn handle_stop(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        if text.trim() != prompts::STOP_CONFIRM_WORD {
            let _ = self.transport.delete_message(user, message_id).await;
            return Ok(());
        }

        let patch = ProfilePatch {
            mute: Some(true),
            ..Default::default()
        };
        self.profiles.update(user, &patch).await?;
        self.clear_flow_state(user).await?;

        self.transport.send_text(user, prompts::STOPPED, None).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Drink logging
    // ------------------------------------------------------------------

    async fn handle_drink_text(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        let volume = match validate::parse_volume(text) {
            Some(v) => v,
            None => {
                let _ = self.transport.delete_message(user, message_id).await;
                let tracked = self.tracker.get(user).await?;
                if tracked.error.is_none() {
                    let id = self
                        .transport
                        .send_text(user, prompts::DRINK_ERROR, Some(&drink_choice_keyboard()))
                        .await?;
                    self.tracker.track_error(user, id).await?;
                }
                return Ok(());
            }
        };

        self.finish_drink(user, volume).await
    }

    async fn record_quick_volume(&self, user: i64, session: Session, ml: u32) -> Result<()> {
        if !matches!(session.stage, Stage::Drink | Stage::DrinkChoice) {
            return Ok(());
        }
        self.finish_drink(user, ml as f64).await
    }

    async fn finish_drink(&self, user: i64, volume: f64) -> Result<()> {
        let tracked = self.tracker.get(user).await?;
        if let Some(error_id) = tracked.error {
            let _ = self.transport.delete_message(user, error_id).await;
        }
        if let Some(prompt_id) = tracked.prompt {
            let _ = self.transport.delete_message(user, prompt_id).await;
        }

        let total = self.sessions.add_drunk(user, volume).await?;
        self.clear_flow_state(user).await?;

        self.transport
            .send_text(user, &prompts::drink_logged(volume, total), None)
            .await?;
        Ok(())
    }

    /// "Custom amount": move to free-text entry without recording anything.
    async fn switch_to_choice(&self, user: i64, mut session: Session) -> Result<()> {
        if session.stage != Stage::Drink {
            return Ok(());
        }
        session.stage = Stage::DrinkChoice;
        self.sessions.put_session(user, &session).await?;

        let tracked = self.tracker.get(user).await?;
        if let Some(prompt_id) = tracked.prompt {
            let _ = self.transport.delete_message(user, prompt_id).await;
        }
        self.tracker.clear(user).await?;

        let id = self
            .transport
            .send_text(user, prompts::DRINK_CHOICE_PROMPT, Some(&drink_choice_keyboard()))
            .await?;
        self.tracker.track_prompt(user, id).await?;
        Ok(())
    }

    /// Snooze: remove the prompt, defer the reminder slot that fired, and
    /// close the drink flow without recording a volume.
    async fn snooze(&self, user: i64, session: Session) -> Result<()> {
        if !matches!(session.stage, Stage::Drink | Stage::DrinkChoice) {
            return Ok(());
        }

        let tracked = self.tracker.get(user).await?;
        if let Some(prompt_id) = tracked.prompt {
            let _ = self
                .transport
                .edit_text(user, prompt_id, prompts::SNOOZED)
                .await;
        }
        if let Some(error_id) = tracked.error {
            let _ = self.transport.delete_message(user, error_id).await;
        }

        if let Some(slot) = self.sessions.take_pending_reminder(user).await? {
            if let Some(reminders) = self.sessions.get_schedule(user).await? {
                let updated = schedule::snooze(&reminders, &slot)?;
                self.sessions.put_schedule(user, &updated).await?;
                info!("User {} snoozed reminder {}", user, slot);
            }
        }

        self.clear_flow_state(user).await
    }

    // ------------------------------------------------------------------
    // Shared step mechanics
    // ------------------------------------------------------------------

    async fn can_begin(&self, user: i64) -> Result<bool> {
        if self.sessions.is_queued(user).await? {
            return Ok(false);
        }
        Ok(self.sessions.get_session(user).await?.is_none())
    }

    /// Persist the session and send its stage prompt.
    async fn enter_stage(&self, user: i64, session: Session) -> Result<()> {
        let stage = session.stage;
        let mode = session.mode;
        self.sessions.put_session(user, &session).await?;

        let id = self
            .transport
            .send_text(
                user,
                prompts::stage_prompt(stage, mode),
                Some(&keyboard_for(stage, mode)),
            )
            .await?;
        self.tracker.track_prompt(user, id).await?;
        Ok(())
    }

    /// Step 1 of every parameter handler: if the prompt is tracked and no
    /// error is pending, re-edit it so it is the last thing the user saw.
    /// If no prompt is tracked at all (crash window after a commit wrote
    /// the profile but before the session cleared), re-send it.
    async fn reissue_prompt(&self, user: i64, stage: Stage, mode: FlowMode) -> Result<()> {
        let tracked = self.tracker.get(user).await?;
        match (tracked.prompt, tracked.error) {
            (Some(prompt_id), None) => {
                let _ = self
                    .transport
                    .edit_text(user, prompt_id, prompts::stage_prompt(stage, mode))
                    .await;
            }
            (None, _) => {
                debug!("User {} at {:?} with no tracked prompt, re-sending", user, stage);
                let id = self
                    .transport
                    .send_text(
                        user,
                        prompts::stage_prompt(stage, mode),
                        Some(&keyboard_for(stage, mode)),
                    )
                    .await?;
                self.tracker.track_prompt(user, id).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Validation failure: delete the offending input, show the correction
    /// once, leave stage and draft untouched.
    async fn reject_input(
        &self,
        user: i64,
        message_id: i64,
        stage: Stage,
        mode: FlowMode,
    ) -> Result<()> {
        let _ = self.transport.delete_message(user, message_id).await;

        let tracked = self.tracker.get(user).await?;
        if tracked.error.is_none() {
            let id = self
                .transport
                .send_text(
                    user,
                    prompts::stage_correction(stage),
                    Some(&keyboard_for(stage, mode)),
                )
                .await?;
            self.tracker.track_error(user, id).await?;
        }
        Ok(())
    }

    /// Validation success: delete the tracked error, advance the stage,
    /// clear tracked messages, then send the next prompt. The ordering is a
    /// correctness requirement: a crash between steps must leave at most
    /// one stale message.
    async fn advance(&self, user: i64, mut session: Session, next: Stage) -> Result<()> {
        self.drop_error(user).await?;

        session.stage = next;
        self.sessions.put_session(user, &session).await?;
        self.tracker.clear(user).await?;

        let id = self
            .transport
            .send_text(
                user,
                prompts::stage_prompt(next, session.mode),
                Some(&keyboard_for(next, session.mode)),
            )
            .await?;
        self.tracker.track_prompt(user, id).await?;
        Ok(())
    }

    /// Remove a tracked inline error, both the message and the slot.
    /// The delete is best-effort; the slot update is not.
    async fn drop_error(&self, user: i64) -> Result<()> {
        let tracked = self.tracker.get(user).await?;
        if let Some(error_id) = tracked.error {
            let _ = self.transport.delete_message(user, error_id).await;
            self.tracker.clear_error(user).await?;
        }
        Ok(())
    }

    /// Remove every piece of per-flow state for the user. Discards any
    /// fired-but-unanswered reminder slot: once the flow closes without a
    /// snooze there is no current slot left to defer.
    async fn clear_flow_state(&self, user: i64) -> Result<()> {
        self.sessions.delete_session(user).await?;
        self.tracker.clear(user).await?;
        self.sessions.remove_queued(user).await?;
        self.sessions.take_pending_reminder(user).await?;
        Ok(())
    }
}

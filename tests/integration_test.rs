//! End-to-end flows through the bot's public event interface, with the
//! chat transport and the location resolver replaced by in-memory fakes.

use async_trait::async_trait;
use hydromate::bot::Bot;
use hydromate::config::Config;
use hydromate::profile::{MemoryProfileStore, Profile, ProfileStore};
use hydromate::resolver::LocationResolver;
use hydromate::session::{MemorySessionStore, SessionStore};
use hydromate::transport::{CallbackData, Event, Keyboard, Transport};
use hydromate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FakeTransport {
    next_id: AtomicI64,
    sent: Mutex<Vec<(i64, i64, String)>>,
    deleted: Mutex<Vec<(i64, i64)>>,
    edited: Mutex<Vec<(i64, i64, String)>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            edited: Mutex::new(Vec::new()),
        }
    }

    fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, _, t)| t.clone()).collect()
    }

    fn last_text(&self) -> String {
        self.sent_texts().last().cloned().unwrap_or_default()
    }

    fn deleted_ids(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().iter().map(|(_, id)| *id).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&self, user: i64, text: &str, _keyboard: Option<&Keyboard>) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((user, id, text.to_string()));
        Ok(id)
    }

    async fn edit_text(&self, user: i64, message_id: i64, text: &str) -> Result<()> {
        self.edited
            .lock()
            .unwrap()
            .push((user, message_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, user: i64, message_id: i64) -> Result<()> {
        self.deleted.lock().unwrap().push((user, message_id));
        Ok(())
    }
}

struct FakeResolver {
    cities: HashMap<String, String>,
}

impl FakeResolver {
    fn new() -> Self {
        let mut cities = HashMap::new();
        cities.insert("Moscow".to_string(), "Europe/Moscow".to_string());
        cities.insert("London".to_string(), "Europe/London".to_string());
        Self { cities }
    }
}

#[async_trait]
impl LocationResolver for FakeResolver {
    async fn resolve_timezone(&self, city: &str) -> Result<Option<String>> {
        Ok(self.cities.get(city).cloned())
    }
}

type TestBot = Bot<FakeTransport, MemorySessionStore, MemoryProfileStore, FakeResolver>;

struct Fixture {
    bot: TestBot,
    transport: Arc<FakeTransport>,
    sessions: Arc<MemorySessionStore>,
    profiles: Arc<MemoryProfileStore>,
    next_message_id: AtomicI64,
}

impl Fixture {
    fn new() -> Self {
        Self::with_session_ttl(Duration::from_secs(3600))
    }

    fn with_session_ttl(ttl: Duration) -> Self {
        let transport = Arc::new(FakeTransport::new());
        let sessions = Arc::new(MemorySessionStore::new(ttl));
        let profiles = Arc::new(MemoryProfileStore::new());
        let bot = Bot::new(
            Arc::clone(&transport),
            Arc::clone(&sessions),
            Arc::clone(&profiles),
            Arc::new(FakeResolver::new()),
            Config::for_test(&std::env::temp_dir()),
        );
        Self {
            bot,
            transport,
            sessions,
            profiles,
            next_message_id: AtomicI64::new(1),
        }
    }

    /// A second bot over the same stores, as after a process restart.
    fn reconnect(&self) -> TestBot {
        Bot::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.sessions),
            Arc::clone(&self.profiles),
            Arc::new(FakeResolver::new()),
            Config::for_test(&std::env::temp_dir()),
        )
    }

    async fn say(&self, user: i64, text: &str) -> i64 {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.bot
            .process_event(Event::Text {
                user,
                message_id,
                text: text.to_string(),
            })
            .await;
        message_id
    }

    async fn press(&self, user: i64, data: CallbackData) {
        self.bot
            .process_event(Event::Button {
                user,
                message_id: 0,
                data,
            })
            .await;
    }

    async fn profile(&self, user: i64) -> Option<Profile> {
        self.profiles.get(user).await.unwrap()
    }
}

#[tokio::test]
async fn test_full_add_wizard() {
    let fx = Fixture::new();

    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;
    fx.say(1, "moscow").await;
    fx.say(1, "08:00-23:00").await;

    let profile = fx.profile(1).await.expect("profile committed");
    assert_eq!(profile.weight, 70.0);
    assert_eq!(profile.city, "Moscow");
    assert_eq!(profile.timezone, "Europe/Moscow");
    assert_eq!(profile.time, ("08:00".to_string(), "23:00".to_string()));
    assert_eq!(profile.goal, 2.45);
    assert!(!profile.mute);

    // Session cleared, schedule generated starting an hour after waking
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
    let schedule = fx.sessions.get_schedule(1).await.unwrap().unwrap();
    assert_eq!(schedule.len(), 13);
    assert_eq!(schedule[0], "09:00");
    assert_eq!(schedule[1], "10:04");

    assert!(fx.transport.last_text().contains("2.45"));
}

#[tokio::test]
async fn test_invalid_input_is_deleted_and_state_kept() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;

    let bad = fx.say(1, "not a weight").await;
    assert!(fx.transport.deleted_ids().contains(&bad));

    // Still at the weight stage; the retry goes through
    fx.say(1, "70").await;
    fx.say(1, "Moscow").await;
    fx.say(1, "08:00-23:00").await;
    assert_eq!(fx.profile(1).await.unwrap().weight, 70.0);
}

#[tokio::test]
async fn test_repeated_invalid_input_sends_one_correction() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;

    fx.say(1, "bad").await;
    let after_first = fx.transport.sent_texts().len();
    fx.say(1, "worse").await;
    fx.say(1, "worst").await;
    assert_eq!(fx.transport.sent_texts().len(), after_first);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;

    fx.press(1, CallbackData::Cancel).await;
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
    assert!(fx.profile(1).await.is_none());
    let edits_after_first = fx.transport.edited.lock().unwrap().len();

    fx.press(1, CallbackData::Cancel).await;
    assert_eq!(fx.transport.edited.lock().unwrap().len(), edits_after_first);
}

#[tokio::test]
async fn test_edit_merges_skipped_stages() {
    let fx = Fixture::new();
    fx.profiles
        .create(&Profile {
            user_id: 1,
            weight: 70.0,
            city: "Moscow".to_string(),
            timezone: "Europe/Moscow".to_string(),
            time: ("08:00".to_string(), "23:00".to_string()),
            goal: 2.45,
            mute: false,
        })
        .await
        .unwrap();

    fx.say(1, "/edit_parameters").await;
    fx.say(1, "80").await;
    fx.press(1, CallbackData::Skip).await; // keep city
    fx.press(1, CallbackData::Skip).await; // keep hours, commits

    let profile = fx.profile(1).await.unwrap();
    assert_eq!(profile.weight, 80.0);
    assert_eq!(profile.goal, 2.8);
    assert_eq!(profile.city, "Moscow");
    assert_eq!(profile.time, ("08:00".to_string(), "23:00".to_string()));
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_add_with_existing_profile_is_noop() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;
    fx.say(1, "Moscow").await;
    fx.say(1, "08:00-23:00").await;

    let sent_before = fx.transport.sent_texts().len();
    fx.say(1, "/add_parameters").await;
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
    assert_eq!(fx.transport.sent_texts().len(), sent_before);
}

#[tokio::test]
async fn test_wizard_survives_reconnect() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;

    // New bot over the same stores picks the wizard up at the city stage
    let bot = fx.reconnect();
    bot.process_event(Event::Text {
        user: 1,
        message_id: 90,
        text: "London".to_string(),
    })
    .await;
    bot.process_event(Event::Text {
        user: 1,
        message_id: 91,
        text: "07:00-22:00".to_string(),
    })
    .await;

    let profile = fx.profile(1).await.unwrap();
    assert_eq!(profile.city, "London");
    assert_eq!(profile.timezone, "Europe/London");
}

#[tokio::test]
async fn test_expired_session_cannot_be_resumed() {
    let fx = Fixture::with_session_ttl(Duration::from_millis(0));
    fx.say(1, "/add_parameters").await;

    // The session expired immediately; the reply is stray text and the
    // wizard does not advance
    let id = fx.say(1, "70").await;
    assert!(fx.transport.deleted_ids().contains(&id));
    assert!(fx.profile(1).await.is_none());
}

#[tokio::test]
async fn test_drink_quick_button() {
    let fx = Fixture::new();
    fx.say(1, "/drink").await;
    fx.press(1, CallbackData::Drank(250)).await;

    assert_eq!(fx.sessions.get_drunk(1).await.unwrap(), 250.0);
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
    assert!(!fx.sessions.is_queued(1).await.unwrap());
    assert!(fx.transport.last_text().contains("250"));
}

#[tokio::test]
async fn test_drink_custom_volume() {
    let fx = Fixture::new();
    fx.say(1, "/drink").await;
    fx.press(1, CallbackData::Choice).await;
    fx.say(1, "330").await;

    assert_eq!(fx.sessions.get_drunk(1).await.unwrap(), 330.0);

    // A later drink accumulates
    fx.say(1, "/drink").await;
    fx.press(1, CallbackData::Drank(200)).await;
    assert_eq!(fx.sessions.get_drunk(1).await.unwrap(), 530.0);
}

#[tokio::test]
async fn test_snooze_defers_fired_slot() {
    let fx = Fixture::new();
    fx.sessions
        .put_schedule(1, &["09:00".to_string(), "10:04".to_string()])
        .await
        .unwrap();
    fx.say(1, "/drink").await;
    // the dispatcher records the slot after the prompt goes out
    fx.sessions.set_pending_reminder(1, "10:04").await.unwrap();
    fx.press(1, CallbackData::Snooze).await;

    assert_eq!(
        fx.sessions.get_schedule(1).await.unwrap().unwrap(),
        vec!["09:00".to_string(), "10:11".to_string()]
    );
}

#[tokio::test]
async fn test_delete_requires_exact_word() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;
    fx.say(1, "Moscow").await;
    fx.say(1, "08:00-23:00").await;

    fx.say(1, "/delete_parameters").await;
    let wrong = fx.say(1, "delete").await;
    assert!(fx.transport.deleted_ids().contains(&wrong));
    assert!(fx.profile(1).await.is_some());

    fx.say(1, "Delete").await;
    assert!(fx.profile(1).await.is_none());
    assert!(fx.sessions.get_schedule(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stop_and_continue() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;
    fx.say(1, "Moscow").await;
    fx.say(1, "08:00-23:00").await;

    fx.say(1, "/stop").await;
    fx.say(1, "Stop").await;
    assert!(fx.profile(1).await.unwrap().mute);

    fx.say(1, "/continue").await;
    assert!(!fx.profile(1).await.unwrap().mute);
}

#[tokio::test]
async fn test_command_aborts_wizard_in_flight() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(1, "70").await;

    fx.say(1, "/help").await;
    assert!(fx.sessions.get_session(1).await.unwrap().is_none());
    assert!(fx.profile(1).await.is_none());
}

#[tokio::test]
async fn test_users_do_not_interfere() {
    let fx = Fixture::new();
    fx.say(1, "/add_parameters").await;
    fx.say(2, "/add_parameters").await;

    fx.say(1, "70").await;
    fx.say(2, "90").await;
    fx.say(1, "Moscow").await;
    fx.say(2, "London").await;
    fx.say(1, "08:00-23:00").await;
    fx.say(2, "06:00-21:00").await;

    assert_eq!(fx.profile(1).await.unwrap().city, "Moscow");
    assert_eq!(fx.profile(2).await.unwrap().city, "London");
    assert_eq!(fx.profile(2).await.unwrap().goal, 3.15);
}

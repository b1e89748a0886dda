//! Durable user profiles
//!
//! A profile is created once by the wizard's terminal step and mutated only
//! by edit-wizard commits, mute toggles and deletion. SQLite backs the
//! production store; an in-memory variant exists for tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Committed user parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub weight: f64,
    pub city: String,
    /// IANA timezone name, e.g. "Europe/Moscow"
    pub timezone: String,
    /// Wake and sleep times as "HH:MM"
    pub time: (String, String),
    /// Daily water goal in litres
    pub goal: f64,
    pub mute: bool,
}

/// Partial profile update; unset fields retain their stored values.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub weight: Option<f64>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub time: Option<(String, String)>,
    pub goal: Option<f64>,
    pub mute: Option<bool>,
}

impl ProfilePatch {
    /// Apply this patch over an existing profile.
    pub fn merge_into(&self, profile: &Profile) -> Profile {
        Profile {
            user_id: profile.user_id,
            weight: self.weight.unwrap_or(profile.weight),
            city: self.city.clone().unwrap_or_else(|| profile.city.clone()),
            timezone: self
                .timezone
                .clone()
                .unwrap_or_else(|| profile.timezone.clone()),
            time: self.time.clone().unwrap_or_else(|| profile.time.clone()),
            goal: self.goal.unwrap_or(profile.goal),
            mute: self.mute.unwrap_or(profile.mute),
        }
    }
}

/// Durable per-user record store
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create(&self, profile: &Profile) -> Result<()>;
    /// Merge `patch` over the stored profile. Fails with
    /// [`Error::ProfileNotFound`] if no profile exists.
    async fn update(&self, user: i64, patch: &ProfilePatch) -> Result<Profile>;
    async fn get(&self, user: i64) -> Result<Option<Profile>>;
    async fn delete(&self, user: i64) -> Result<()>;
    /// All profiles, for the reminder dispatcher.
    async fn list_all(&self) -> Result<Vec<Profile>>;
}

/// SQLite-backed profile store
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id  INTEGER PRIMARY KEY,
                weight   REAL NOT NULL,
                city     TEXT NOT NULL,
                timezone TEXT NOT NULL,
                wake     TEXT NOT NULL,
                sleep    TEXT NOT NULL,
                goal     REAL NOT NULL,
                mute     INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
        Ok(Profile {
            user_id: row.get(0)?,
            weight: row.get(1)?,
            city: row.get(2)?,
            timezone: row.get(3)?,
            time: (row.get(4)?, row.get(5)?),
            goal: row.get(6)?,
            mute: row.get::<_, i64>(7)? != 0,
        })
    }

    fn get_sync(conn: &Connection, user: i64) -> Result<Option<Profile>> {
        let profile = conn
            .query_row(
                "SELECT user_id, weight, city, timezone, wake, sleep, goal, mute
                 FROM profiles WHERE user_id = ?1",
                [user],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    fn write_sync(conn: &Connection, profile: &Profile) -> Result<()> {
        conn.execute(
            "INSERT INTO profiles (user_id, weight, city, timezone, wake, sleep, goal, mute)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                 weight = excluded.weight,
                 city = excluded.city,
                 timezone = excluded.timezone,
                 wake = excluded.wake,
                 sleep = excluded.sleep,
                 goal = excluded.goal,
                 mute = excluded.mute",
            params![
                profile.user_id,
                profile.weight,
                profile.city,
                profile.timezone,
                profile.time.0,
                profile.time.1,
                profile.goal,
                profile.mute as i64,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn create(&self, profile: &Profile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_sync(&conn, profile)
    }

    async fn update(&self, user: i64, patch: &ProfilePatch) -> Result<Profile> {
        let conn = self.conn.lock().unwrap();
        let existing = Self::get_sync(&conn, user)?.ok_or(Error::ProfileNotFound(user))?;
        let merged = patch.merge_into(&existing);
        Self::write_sync(&conn, &merged)?;
        Ok(merged)
    }

    async fn get(&self, user: i64) -> Result<Option<Profile>> {
        let conn = self.conn.lock().unwrap();
        Self::get_sync(&conn, user)
    }

    async fn delete(&self, user: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM profiles WHERE user_id = ?1", [user])?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Profile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, weight, city, timezone, wake, sleep, goal, mute
             FROM profiles ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], Self::row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }
}

/// In-memory profile store for tests
#[derive(Default)]
pub struct MemoryProfileStore {
    data: Mutex<HashMap<i64, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn create(&self, profile: &Profile) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn update(&self, user: i64, patch: &ProfilePatch) -> Result<Profile> {
        let mut data = self.data.lock().unwrap();
        let existing = data.get(&user).ok_or(Error::ProfileNotFound(user))?;
        let merged = patch.merge_into(existing);
        data.insert(user, merged.clone());
        Ok(merged)
    }

    async fn get(&self, user: i64) -> Result<Option<Profile>> {
        Ok(self.data.lock().unwrap().get(&user).cloned())
    }

    async fn delete(&self, user: i64) -> Result<()> {
        self.data.lock().unwrap().remove(&user);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.data.lock().unwrap().values().cloned().collect();
        profiles.sort_by_key(|p| p.user_id);
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(user: i64) -> Profile {
        Profile {
            user_id: user,
            weight: 70.0,
            city: "Moscow".to_string(),
            timezone: "Europe/Moscow".to_string(),
            time: ("08:00".to_string(), "23:00".to_string()),
            goal: 2.45,
            mute: false,
        }
    }

    #[tokio::test]
    async fn test_sqlite_create_and_get() {
        let temp = TempDir::new().unwrap();
        let store = SqliteProfileStore::open(&temp.path().join("test.db")).unwrap();

        assert!(store.get(1).await.unwrap().is_none());
        store.create(&sample(1)).await.unwrap();

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded, sample(1));
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.db");

        {
            let store = SqliteProfileStore::open(&path).unwrap();
            store.create(&sample(1)).await.unwrap();
        }

        let store = SqliteProfileStore::open(&path).unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().city, "Moscow");
    }

    #[tokio::test]
    async fn test_sqlite_update_merges() {
        let temp = TempDir::new().unwrap();
        let store = SqliteProfileStore::open(&temp.path().join("test.db")).unwrap();
        store.create(&sample(1)).await.unwrap();

        let patch = ProfilePatch {
            weight: Some(80.0),
            goal: Some(2.8),
            ..Default::default()
        };
        let merged = store.update(1, &patch).await.unwrap();

        assert_eq!(merged.weight, 80.0);
        assert_eq!(merged.goal, 2.8);
        // untouched fields retained
        assert_eq!(merged.city, "Moscow");
        assert_eq!(merged.time.1, "23:00");

        let reloaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(reloaded, merged);
    }

    #[tokio::test]
    async fn test_sqlite_update_missing_profile() {
        let temp = TempDir::new().unwrap();
        let store = SqliteProfileStore::open(&temp.path().join("test.db")).unwrap();

        let result = store.update(99, &ProfilePatch::default()).await;
        assert!(matches!(result, Err(Error::ProfileNotFound(99))));
    }

    #[tokio::test]
    async fn test_sqlite_delete_and_list() {
        let temp = TempDir::new().unwrap();
        let store = SqliteProfileStore::open(&temp.path().join("test.db")).unwrap();

        store.create(&sample(2)).await.unwrap();
        store.create(&sample(1)).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id, 1);

        store.delete(1).await.unwrap();
        assert!(store.get(1).await.unwrap().is_none());
        assert_eq!(store.list_all().await.unwrap().len(), 1);

        // deleting a missing profile is not an error
        store.delete(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_update() {
        let store = MemoryProfileStore::new();
        store.create(&sample(1)).await.unwrap();

        let patch = ProfilePatch {
            mute: Some(true),
            ..Default::default()
        };
        let merged = store.update(1, &patch).await.unwrap();
        assert!(merged.mute);
        assert_eq!(merged.weight, 70.0);
    }

    #[test]
    fn test_patch_merge_keeps_unset_fields() {
        let profile = sample(1);
        let patch = ProfilePatch {
            city: Some("Kazan".to_string()),
            timezone: Some("Europe/Moscow".to_string()),
            ..Default::default()
        };
        let merged = patch.merge_into(&profile);
        assert_eq!(merged.city, "Kazan");
        assert_eq!(merged.weight, 70.0);
        assert_eq!(merged.time, profile.time);
    }
}
